//!
//! sessionauth demo server
//! -----------------------
//! Small embedding application: an in-memory user directory with Argon2 passwords,
//! a `DemoAccount` implementing `Account`, and routes guarded by `LoginRequired`
//! and `AdminRequired`. Configuration comes from CLI flags and `SESSIONAUTH_*`
//! environment variables.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use password_hash::{PasswordHash, SaltString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use sessionauth::identity::{authenticate_session, logout, Account, Guard, SessionResolver, SessionRegistry};
use sessionauth::server::{require, spawn_session_sweeper, with_auth, CurrentAccount, SessionHandle};
use sessionauth::{AppError, AppResult, AuthConfig};

#[derive(Debug)]
struct UserRecord {
    username: String,
    password_hash: String,
    is_admin: bool,
}

#[derive(Debug, Default)]
struct UserDirectory {
    users: HashMap<u32, UserRecord>,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let phc = Argon2::default().hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

impl UserDirectory {
    fn add(&mut self, id: u32, username: &str, password: &str, is_admin: bool) -> Result<()> {
        let password_hash = hash_password(password)?;
        self.users.insert(id, UserRecord { username: username.to_string(), password_hash, is_admin });
        Ok(())
    }

    /// Credential check; returns the user id on success.
    fn verify(&self, username: &str, password: &str) -> Option<u32> {
        self.users
            .iter()
            .find(|(_, u)| u.username.eq_ignore_ascii_case(username))
            .filter(|(_, u)| verify_password(&u.password_hash, password))
            .map(|(id, _)| *id)
    }
}

#[derive(Debug, thiserror::Error)]
enum LookupError {
    #[error("no user with id {0}")]
    UnknownId(u32),
}

#[derive(Debug, Clone)]
struct DemoAccount {
    directory: Arc<UserDirectory>,
    id: u32,
    username: String,
    admin: bool,
    authenticated: bool,
}

impl DemoAccount {
    fn anonymous(directory: Arc<UserDirectory>) -> Self {
        Self { directory, id: 0, username: String::new(), admin: false, authenticated: false }
    }
}

impl Account for DemoAccount {
    type Id = u32;
    type Error = LookupError;

    fn is_authenticated(&self) -> bool { self.authenticated }

    fn is_admin(&self) -> bool { self.admin }

    fn login(&mut self) { self.authenticated = true; }

    fn logout(&mut self) {
        self.authenticated = false;
        self.admin = false;
    }

    fn unique_id(&self) -> u32 { self.id }

    fn get_by_id(&self, id: &u32) -> Result<Self, LookupError> {
        let rec = self.directory.users.get(id).ok_or(LookupError::UnknownId(*id))?;
        Ok(Self {
            directory: self.directory.clone(),
            id: *id,
            username: rec.username.clone(),
            admin: rec.is_admin,
            authenticated: false,
        })
    }
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<AuthConfig>,
    directory: Arc<UserDirectory>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload { username: String, password: String }

#[derive(Debug, Deserialize)]
struct NextQuery { next: Option<String> }

fn describe(account: &DemoAccount) -> Value {
    json!({
        "authenticated": account.is_authenticated(),
        "admin": account.is_admin(),
        "id": account.unique_id(),
        "username": account.username,
    })
}

async fn whoami(CurrentAccount(ctx): CurrentAccount<DemoAccount>) -> Json<Value> {
    Json(json!({"status": "ok", "request_id": ctx.request_id(), "account": describe(ctx.account())}))
}

async fn login_page(Query(q): Query<NextQuery>) -> Json<Value> {
    Json(json!({"status": "login_required", "next": q.next, "hint": "POST {username,password} to this path"}))
}

async fn login(
    State(state): State<AppState>,
    mut session: SessionHandle,
    CurrentAccount(ctx): CurrentAccount<DemoAccount>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Json<Value>> {
    let Some(id) = state.directory.verify(&payload.username, &payload.password) else {
        return Err(AppError::auth("invalid_credentials", "invalid username or password"));
    };
    let mut account = ctx.account().get_by_id(&id).map_err(|e| AppError::internal("lookup_failed".to_string(), e.to_string()))?;
    authenticate_session(&state.cfg, &mut session, &mut account)?;
    info!(target: "sessionauth", user = %account.username, "login");
    Ok(Json(json!({"status": "ok", "account": describe(&account)})))
}

async fn logout_handler(
    State(state): State<AppState>,
    mut session: SessionHandle,
    CurrentAccount(mut ctx): CurrentAccount<DemoAccount>,
) -> AppResult<Json<Value>> {
    logout(&state.cfg, &mut session, ctx.account_mut())?;
    Ok(Json(json!({"status": "ok"})))
}

async fn dashboard(CurrentAccount(ctx): CurrentAccount<DemoAccount>) -> Json<Value> {
    Json(json!({"status": "ok", "page": "dashboard", "user": ctx.account().username}))
}

async fn admin_home(CurrentAccount(ctx): CurrentAccount<DemoAccount>) -> Json<Value> {
    Json(json!({"status": "ok", "page": "admin", "user": ctx.account().username}))
}

fn build_app(cfg: Arc<AuthConfig>, directory: Arc<UserDirectory>, registry: SessionRegistry) -> Router {
    let state = AppState { cfg: cfg.clone(), directory: directory.clone() };

    let public = Router::new()
        .route("/", get(whoami))
        .route(&cfg.redirect_url, get(login_page).post(login))
        .route(&cfg.admin_redirect_url, get(login_page).post(login))
        .route("/account/logout", post(logout_handler))
        .with_state(state);
    let members = require::<DemoAccount>(Guard::LoginRequired, Router::new().route("/dashboard", get(dashboard)), cfg.clone());
    let admins = require::<DemoAccount>(Guard::AdminRequired, Router::new().route("/admin", get(admin_home)), cfg.clone());

    let resolver = SessionResolver::new(cfg, move || DemoAccount::anonymous(directory.clone()));
    with_auth(public.merge(members).merge(admins), registry, resolver)
}

fn parse_port_env(name: &str) -> Option<u16> {
    env::var(name).ok().and_then(|v| v.parse::<u16>().ok())
}

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    args.windows(2).find(|w| w[0] == flag).and_then(|w| w[1].parse::<u16>().ok())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .try_init();

    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("sessionauth demo server\n\nUSAGE:\n  sessionauth_server [--http-port N]\n\nOPTIONS:\n  --http-port N   HTTP port (env: SESSIONAUTH_HTTP_PORT, default 7878)\n\nUSERS:\n  admin/admin (admin), guest/guest\n");
        return Ok(());
    }
    let http_port = parse_port_arg(&args, "--http-port").or_else(|| parse_port_env("SESSIONAUTH_HTTP_PORT")).unwrap_or(7878);

    let cfg = Arc::new(AuthConfig::from_env());
    info!(
        target: "startup",
        "sessionauth starting: http_port={}, redirect_url={}, admin_redirect_url={}, redirect_param={}, session_key={}",
        http_port, cfg.redirect_url, cfg.admin_redirect_url, cfg.redirect_param, cfg.session_key
    );

    let mut directory = UserDirectory::default();
    directory.add(1, "admin", "admin", true)?;
    directory.add(2, "guest", "guest", false)?;

    let registry = SessionRegistry::default();
    spawn_session_sweeper(registry.clone(), Duration::from_secs(30));

    let app = build_app(cfg, Arc::new(directory), registry);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
