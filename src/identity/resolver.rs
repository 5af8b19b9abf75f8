use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Account, AuthState, RequestContext, SessionError, SessionStore};
use crate::config::AuthConfig;

type Factory<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Turns session state into the account bound to the current request.
///
/// The factory must return a zero-value (anonymous) account. The resolver never
/// writes to the session; a session identity that fails to resolve leaves the
/// request anonymous and is reported as `AuthState::Stale`.
pub struct SessionResolver<A> {
    config: Arc<AuthConfig>,
    factory: Factory<A>,
}

impl<A> Clone for SessionResolver<A> {
    fn clone(&self) -> Self {
        Self { config: self.config.clone(), factory: self.factory.clone() }
    }
}

impl<A: Account> SessionResolver<A> {
    pub fn new<F>(config: Arc<AuthConfig>, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self { config, factory: Arc::new(factory) }
    }

    pub fn config(&self) -> &AuthConfig { &self.config }

    /// Fresh anonymous account from the application's factory.
    pub fn anonymous(&self) -> A { (self.factory)() }

    pub fn resolve<S: SessionStore + ?Sized>(&self, session: &S) -> Result<RequestContext<A>, SessionError> {
        let key = self.config.session_key.as_str();
        let account = self.anonymous();

        let raw = match session.get(key)? {
            None | Some(Value::Null) => {
                debug!(target: "sessionauth", key, "no session identity; binding anonymous account");
                return Ok(RequestContext::bind(account, AuthState::Anonymous));
            }
            Some(v) => v,
        };

        let id: A::Id = match serde_json::from_value(raw) {
            Ok(id) => id,
            Err(e) => {
                warn!(target: "sessionauth", key, error = %e, "unreadable session identity; continuing as anonymous");
                return Ok(RequestContext::bind(account, AuthState::Stale));
            }
        };
        debug!(target: "sessionauth", ?id, "resolving session identity");

        match account.get_by_id(&id) {
            Ok(mut found) => {
                found.login();
                debug!(target: "sessionauth", ?id, admin = found.is_admin(), "session account authenticated");
                Ok(RequestContext::bind(found, AuthState::Authenticated))
            }
            Err(e) => {
                warn!(target: "sessionauth", ?id, error = %e, "login error: session identity did not resolve; continuing as anonymous");
                Ok(RequestContext::bind(account, AuthState::Stale))
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
