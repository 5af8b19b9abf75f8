//!
//! sessionauth HTTP integration
//! ----------------------------
//! Axum middleware that wires the identity core into a request pipeline.
//!
//! Responsibilities:
//! - Cookie-keyed session loading and write-back against a `SessionRegistry`.
//! - Running the `SessionResolver` once per request and publishing its `RequestContext`.
//! - `login_required` / `admin_required` guards answering 302 to the configured login pages.
//! - Extractors for the bound account and the request's session.
//!
//! Layer order matters: `session_layer` must wrap `resolve_account`, which must wrap any guard.
//! `with_auth` and `require` apply them in that order.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, OriginalUri, Request, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info};

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{
    Account, AuthState, Guard, GuardOutcome, MemorySession, RequestContext, SessionError, SessionRegistry,
    SessionResolver, SessionStore,
};

pub const SESSION_COOKIE: &str = "sessionauth_session";

/// The current request's session, shared between middleware and handlers.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<MemorySession>>,
}

impl SessionHandle {
    pub fn new(session: MemorySession) -> Self { Self { inner: Arc::new(Mutex::new(session)) } }

    /// Copy of the session as it stands now.
    pub fn snapshot(&self) -> MemorySession { self.inner.lock().clone() }
}

impl SessionStore for SessionHandle {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> { self.inner.lock().get(key) }

    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError> { self.inner.lock().set(key, value) }

    fn delete(&mut self, key: &str) -> Result<(), SessionError> { self.inner.lock().delete(key) }

    fn renew(&mut self) -> Result<(), SessionError> { self.inner.lock().renew() }
}

impl<S: Send + Sync> FromRequestParts<S> for SessionHandle {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionHandle>().cloned().ok_or_else(|| {
            error!(target: "sessionauth", "SessionHandle requested but session_layer is not installed");
            AppError::internal("missing_session", "session layer not installed")
        })
    }
}

/// Extractor for the account bound by `resolve_account`.
#[derive(Debug, Clone)]
pub struct CurrentAccount<A>(pub RequestContext<A>);

impl<S, A> FromRequestParts<S> for CurrentAccount<A>
where
    S: Send + Sync,
    A: Account + Clone + Send + Sync + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext<A>>().cloned().map(CurrentAccount).ok_or_else(missing_context)
    }
}

fn missing_context() -> AppError {
    error!(target: "sessionauth", "request context requested but resolve_account is not installed");
    AppError::internal("missing_request_context", "account resolver layer not installed")
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn set_session_cookie(sid: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, sid)).ok()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("sessionauth_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/")
}

/// Load the cookie's session, expose it as a `SessionHandle`, and write its changes back after the handler ran.
///
/// Sessions are only stored once something was written to them. A session emptied by the
/// handler is removed and its cookie cleared. A renewed session moves to a new id and cookie.
/// If the write-back fails the handler's response is replaced by a 503.
pub async fn session_layer(State(registry): State<SessionRegistry>, mut req: Request, next: Next) -> Response {
    let cookie_sid = parse_cookie(req.headers(), SESSION_COOKIE);
    let (sid, session) = match cookie_sid.as_deref().and_then(|s| registry.load(s).map(|sess| (s.to_string(), sess))) {
        Some((sid, sess)) => (Some(sid), sess),
        None => (None, MemorySession::new()),
    };
    let handle = SessionHandle::new(session);
    req.extensions_mut().insert(handle.clone());

    let mut resp = next.run(req).await;

    let snapshot = handle.snapshot();
    if !snapshot.is_dirty() {
        return resp;
    }
    match registry.commit(sid.as_deref(), &snapshot) {
        Ok(Some(stored)) if sid.as_deref() != Some(stored.as_str()) => match set_session_cookie(&stored) {
            Some(v) => { resp.headers_mut().append(SET_COOKIE, v); }
            None => error!(target: "sessionauth", "generated session id is not a valid cookie value"),
        },
        Ok(Some(_)) => {}
        Ok(None) => {
            if sid.is_some() {
                resp.headers_mut().append(SET_COOKIE, clear_session_cookie());
            }
        }
        Err(err) => {
            error!(target: "sessionauth", error = %err, "session write-back failed");
            return AppError::from(err).into_response();
        }
    }
    resp
}

/// Resolve the session's account and publish it for the rest of the pipeline.
pub async fn resolve_account<A>(State(resolver): State<SessionResolver<A>>, mut req: Request, next: Next) -> AppResult<Response>
where
    A: Account + Clone + Send + Sync + 'static,
{
    let Some(mut session) = req.extensions().get::<SessionHandle>().cloned() else {
        error!(target: "sessionauth", "resolve_account runs without session_layer");
        return Err(AppError::internal("missing_session", "session layer not installed"));
    };
    let ctx = resolver.resolve(&session)?;
    if ctx.state() == AuthState::Stale && resolver.config().purge_stale_identity {
        session.delete(&resolver.config().session_key)?;
        info!(target: "sessionauth", request_id = ctx.request_id(), "purged stale session identity");
    }
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

pub async fn login_required<A>(State(cfg): State<Arc<AuthConfig>>, req: Request, next: Next) -> AppResult<Response>
where
    A: Account + Clone + Send + Sync + 'static,
{
    enforce::<A>(Guard::LoginRequired, &cfg, req, next).await
}

pub async fn admin_required<A>(State(cfg): State<Arc<AuthConfig>>, req: Request, next: Next) -> AppResult<Response>
where
    A: Account + Clone + Send + Sync + 'static,
{
    enforce::<A>(Guard::AdminRequired, &cfg, req, next).await
}

async fn enforce<A>(guard: Guard, cfg: &AuthConfig, req: Request, next: Next) -> AppResult<Response>
where
    A: Account + Clone + Send + Sync + 'static,
{
    let outcome = {
        let ctx = req.extensions().get::<RequestContext<A>>().ok_or_else(missing_context)?;
        // nested routers strip their prefix from uri(); the redirect must carry the full path
        let path = match req.extensions().get::<OriginalUri>() {
            Some(OriginalUri(uri)) => uri.path(),
            None => req.uri().path(),
        };
        guard.check(cfg, ctx.account(), path)
    };
    match outcome {
        GuardOutcome::Pass => Ok(next.run(req).await),
        GuardOutcome::Redirect(target) => Ok(found(&target)),
    }
}

/// 302 Found with `Location: target`.
pub fn found(target: &str) -> Response {
    match HeaderValue::from_str(target) {
        Ok(loc) => (StatusCode::FOUND, [(LOCATION, loc)]).into_response(),
        Err(_) => AppError::internal("bad_redirect_target", "redirect target is not a valid header value").into_response(),
    }
}

/// Install the session and resolver layers on every route of `router`.
pub fn with_auth<A>(router: Router, registry: SessionRegistry, resolver: SessionResolver<A>) -> Router
where
    A: Account + Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(resolver, resolve_account::<A>))
        .layer(middleware::from_fn_with_state(registry, session_layer))
}

/// Put `guard` in front of every route of `router`. Apply before `with_auth`.
pub fn require<A>(guard: Guard, router: Router, cfg: Arc<AuthConfig>) -> Router
where
    A: Account + Clone + Send + Sync + 'static,
{
    match guard {
        Guard::LoginRequired => router.route_layer(middleware::from_fn_with_state(cfg, login_required::<A>)),
        Guard::AdminRequired => router.route_layer(middleware::from_fn_with_state(cfg, admin_required::<A>)),
    }
}

/// Periodically drop expired sessions from `registry`.
pub fn spawn_session_sweeper(registry: SessionRegistry, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let removed = registry.sweep_expired();
            if removed > 0 { tracing::debug!(target: "sessionauth", removed = removed, "session_sweep"); }
        }
    })
}
