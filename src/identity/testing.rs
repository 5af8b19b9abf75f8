//! Fixtures used by the identity unit tests.

use serde_json::Value;
use thiserror::Error;

use super::{Account, SessionError, SessionStore};

pub(crate) const ALICE: u64 = 1;
pub(crate) const ROOT: u64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TestAccount {
    pub id: u64,
    pub name: String,
    pub admin: bool,
    pub authenticated: bool,
    pub login_calls: u32,
}

#[derive(Debug, Error)]
#[error("account {0} not found")]
pub(crate) struct NotFound(pub u64);

impl TestAccount {
    pub(crate) fn member(id: u64, name: &str) -> Self {
        Self { id, name: name.to_string(), ..Default::default() }
    }
}

impl Account for TestAccount {
    type Id = u64;
    type Error = NotFound;

    fn is_authenticated(&self) -> bool { self.authenticated }

    fn is_admin(&self) -> bool { self.admin }

    fn login(&mut self) {
        self.authenticated = true;
        self.login_calls += 1;
    }

    fn logout(&mut self) {
        self.authenticated = false;
        self.admin = false;
        self.name.clear();
    }

    fn unique_id(&self) -> u64 { self.id }

    fn get_by_id(&self, id: &u64) -> Result<Self, NotFound> {
        match *id {
            ALICE => Ok(TestAccount::member(ALICE, "alice")),
            ROOT => Ok(TestAccount { admin: true, ..TestAccount::member(ROOT, "root") }),
            other => Err(NotFound(other)),
        }
    }
}

/// Store whose backend is down: every operation fails.
pub(crate) struct OfflineStore;

impl SessionStore for OfflineStore {
    fn get(&self, _key: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::Unavailable("connection refused".into()))
    }
    fn set(&mut self, _key: &str, _value: Value) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("connection refused".into()))
    }
    fn delete(&mut self, _key: &str) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("connection refused".into()))
    }
}
