//! Imperative login/logout helpers, called by application code once credentials
//! have been checked elsewhere.

use tracing::debug;

use super::{Account, SessionError, SessionStore};
use crate::config::AuthConfig;

/// Mark `account` as logged in and store its identity in the session.
/// The session is asked to renew its id first. Calling it again for the same
/// account leaves the stored values unchanged.
pub fn authenticate_session<A, S>(cfg: &AuthConfig, session: &mut S, account: &mut A) -> Result<(), SessionError>
where
    A: Account,
    S: SessionStore + ?Sized,
{
    account.login();
    debug!(target: "sessionauth", id = ?account.unique_id(), "account authenticated");
    // new identity, new session id
    session.renew()?;
    update(cfg, session, account)
}

/// Log `account` out and drop its identity from the session.
pub fn logout<A, S>(cfg: &AuthConfig, session: &mut S, account: &mut A) -> Result<(), SessionError>
where
    A: Account,
    S: SessionStore + ?Sized,
{
    account.logout();
    session.delete(&cfg.session_key)?;
    debug!(target: "sessionauth", key = cfg.session_key.as_str(), "session identity cleared");
    Ok(())
}

/// Write the account's unique id under the session key, replacing whatever was there.
pub fn update<A, S>(cfg: &AuthConfig, session: &mut S, account: &A) -> Result<(), SessionError>
where
    A: Account,
    S: SessionStore + ?Sized,
{
    let value = serde_json::to_value(account.unique_id())
        .map_err(|source| SessionError::Encode { key: cfg.session_key.clone(), source })?;
    session.set(&cfg.session_key, value)
}
