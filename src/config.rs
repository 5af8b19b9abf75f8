//! Authentication guard configuration.
//! One `AuthConfig` is built at startup and handed to the resolver and guards; nothing here is global.

use serde::{Deserialize, Serialize};

pub const DEFAULT_REDIRECT_URL: &str = "/account/login";
pub const DEFAULT_ADMIN_REDIRECT_URL: &str = "/admin/account/login";
pub const DEFAULT_REDIRECT_PARAM: &str = "next";
pub const DEFAULT_SESSION_KEY: &str = "AUTH_UNIQUE_ID";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Login route used by `Guard::LoginRequired`.
    pub redirect_url: String,
    /// Login route used by `Guard::AdminRequired`.
    pub admin_redirect_url: String,
    /// Query parameter carrying the path the caller was trying to reach.
    pub redirect_param: String,
    /// Session key holding the serialized unique id of the logged-in account.
    pub session_key: String,
    /// Percent-encode the original path in redirect targets (`/` stays literal).
    pub encode_redirect_path: bool,
    /// Let the HTTP layer delete a session identity that no longer resolves.
    pub purge_stale_identity: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            admin_redirect_url: DEFAULT_ADMIN_REDIRECT_URL.to_string(),
            redirect_param: DEFAULT_REDIRECT_PARAM.to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            encode_redirect_path: true,
            purge_stale_identity: false,
        }
    }
}

impl AuthConfig {
    pub fn with_redirect_url<S: Into<String>>(mut self, url: S) -> Self { self.redirect_url = url.into(); self }
    pub fn with_admin_redirect_url<S: Into<String>>(mut self, url: S) -> Self { self.admin_redirect_url = url.into(); self }
    pub fn with_redirect_param<S: Into<String>>(mut self, param: S) -> Self { self.redirect_param = param.into(); self }
    pub fn with_session_key<S: Into<String>>(mut self, key: S) -> Self { self.session_key = key.into(); self }
    pub fn with_encode_redirect_path(mut self, on: bool) -> Self { self.encode_redirect_path = on; self }
    pub fn with_purge_stale_identity(mut self, on: bool) -> Self { self.purge_stale_identity = on; self }

    /// Defaults overlaid with any `SESSIONAUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` but reads values through `lookup`, so callers (and tests) can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = non_empty(lookup("SESSIONAUTH_REDIRECT_URL")) { cfg.redirect_url = v; }
        if let Some(v) = non_empty(lookup("SESSIONAUTH_ADMIN_REDIRECT_URL")) { cfg.admin_redirect_url = v; }
        if let Some(v) = non_empty(lookup("SESSIONAUTH_REDIRECT_PARAM")) { cfg.redirect_param = v; }
        if let Some(v) = non_empty(lookup("SESSIONAUTH_SESSION_KEY")) { cfg.session_key = v; }
        if let Some(b) = lookup("SESSIONAUTH_ENCODE_REDIRECT_PATH").as_deref().and_then(parse_bool) {
            cfg.encode_redirect_path = b;
        }
        if let Some(b) = lookup("SESSIONAUTH_PURGE_STALE_IDENTITY").as_deref().and_then(parse_bool) {
            cfg.purge_stale_identity = b;
        }
        cfg
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AuthConfig::default();
        assert_eq!(cfg.redirect_url, "/account/login");
        assert_eq!(cfg.admin_redirect_url, "/admin/account/login");
        assert_eq!(cfg.redirect_param, "next");
        assert_eq!(cfg.session_key, "AUTH_UNIQUE_ID");
        assert!(cfg.encode_redirect_path);
        assert!(!cfg.purge_stale_identity);
    }

    #[test]
    fn lookup_overlays_only_present_values() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("SESSIONAUTH_REDIRECT_URL", "/signin");
        env.insert("SESSIONAUTH_SESSION_KEY", "  ");
        env.insert("SESSIONAUTH_PURGE_STALE_IDENTITY", "yes");
        env.insert("SESSIONAUTH_ENCODE_REDIRECT_PATH", "maybe");
        let cfg = AuthConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.redirect_url, "/signin");
        assert_eq!(cfg.session_key, DEFAULT_SESSION_KEY);
        assert!(cfg.purge_stale_identity);
        // unparseable bool keeps the default
        assert!(cfg.encode_redirect_path);
    }

    #[test]
    fn deserialize_fills_missing_fields() {
        let cfg: AuthConfig = serde_json::from_str(r#"{"redirect_param":"return_to"}"#).unwrap();
        assert_eq!(cfg.redirect_param, "return_to");
        assert_eq!(cfg.redirect_url, DEFAULT_REDIRECT_URL);
    }
}
