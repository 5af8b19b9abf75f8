use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::tprintln;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode session value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to generate session id: {0}")]
    IdGeneration(String),
}

/// Key/value state scoped to one client session.
///
/// Values are opaque JSON. Every call is treated as a single atomic step;
/// locking and persistence are the store's business.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError>;
    /// Deleting an absent key succeeds.
    fn delete(&mut self, key: &str) -> Result<(), SessionError>;

    /// Ask for the session to be reissued under a new id, keeping its contents.
    /// Stores that have no notion of an id ignore this.
    fn renew(&mut self) -> Result<(), SessionError> { Ok(()) }
}

/// Plain in-memory session.
///
/// Besides the current values it records each key set or deleted since it was loaded
/// (`Some` = set, `None` = deleted), so a write-back only touches what this request changed.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, Value>,
    changes: HashMap<String, Option<Value>>,
    renew: bool,
}

impl MemorySession {
    pub fn new() -> Self { Self::default() }

    pub fn from_values(values: HashMap<String, Value>) -> Self { Self { values, ..Self::default() } }

    pub fn is_dirty(&self) -> bool { self.renew || !self.changes.is_empty() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn renew_requested(&self) -> bool { self.renew }

    pub fn values(&self) -> &HashMap<String, Value> { &self.values }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value.clone());
            self.changes.insert(key.to_string(), Some(value));
        }
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), SessionError> {
        if self.values.remove(key).is_some() {
            self.changes.insert(key.to_string(), None);
        }
        Ok(())
    }

    fn renew(&mut self) -> Result<(), SessionError> {
        self.renew = true;
        Ok(())
    }
}

#[derive(Debug)]
struct RegistryEntry {
    values: HashMap<String, Value>,
    expires_at: Instant,
}

/// Process-local table of sessions keyed by an opaque session id.
///
/// Stand-in backend for the cookie session layer: no signing, no durability.
/// Expiry slides: every successful `load` or `commit` pushes it out by the TTL.
#[derive(Clone)]
pub struct SessionRegistry {
    entries: Arc<RwLock<HashMap<String, RegistryEntry>>>,
    ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

pub(crate) fn gen_id() -> Result<String, SessionError> { id_from(getrandom::getrandom) }

fn id_from<F>(fill: F) -> Result<String, SessionError>
where
    F: FnOnce(&mut [u8]) -> Result<(), getrandom::Error>,
{
    // 256-bit random id, base64url without padding
    let mut buf = [0u8; 32];
    fill(&mut buf).map_err(|e| SessionError::IdGeneration(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Snapshot of a live session, refreshing its expiry. Expired entries are dropped and reported as absent.
    pub fn load(&self, sid: &str) -> Option<MemorySession> {
        let now = Instant::now();
        let mut map = self.entries.write();
        let expired = match map.get_mut(sid) {
            Some(ent) if ent.expires_at > now => {
                ent.expires_at = now + self.ttl;
                return Some(MemorySession::from_values(ent.values.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            map.remove(sid);
            tprintln!("session.expired sid={}", sid);
        }
        None
    }

    /// Apply the keys `session` changed onto the entry stored under `sid`.
    ///
    /// Keys the session did not touch keep whatever the registry holds now, so concurrent
    /// requests on the same session only overwrite each other key by key. A new id is
    /// allocated when `sid` is `None` or the session asked to be renewed; the old entry
    /// is dropped in that case. Returns the id the session now lives under, or `None`
    /// when the result is empty and nothing is stored.
    pub fn commit(&self, sid: Option<&str>, session: &MemorySession) -> Result<Option<String>, SessionError> {
        let target = match sid {
            Some(sid) if !session.renew => sid.to_string(),
            _ => gen_id()?,
        };
        let now = Instant::now();
        let mut map = self.entries.write();
        let mut values = sid
            .and_then(|sid| map.remove(sid))
            .filter(|ent| ent.expires_at > now)
            .map(|ent| ent.values)
            .unwrap_or_default();
        for (key, change) in &session.changes {
            match change {
                Some(v) => { values.insert(key.clone(), v.clone()); }
                None => { values.remove(key); }
            }
        }
        if values.is_empty() {
            tprintln!("session.drop sid={:?}", sid);
            return Ok(None);
        }
        tprintln!("session.commit sid={} changed={} keys={}", target, session.changes.len(), values.len());
        map.insert(target.clone(), RegistryEntry { values, expires_at: now + self.ttl });
        Ok(Some(target))
    }

    pub fn remove(&self, sid: &str) -> bool {
        self.entries.write().remove(sid).is_some()
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, ent| ent.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_key(key: &str, value: Value) -> MemorySession {
        let mut s = MemorySession::new();
        s.set(key, value).unwrap();
        s
    }

    #[test]
    fn memory_session_tracks_changes() {
        let mut s = MemorySession::new();
        assert!(!s.is_dirty());
        s.delete("missing").unwrap();
        assert!(!s.is_dirty());
        s.set("k", json!(7)).unwrap();
        assert!(s.is_dirty());
        assert_eq!(s.get("k").unwrap(), Some(json!(7)));
    }

    #[test]
    fn setting_same_value_is_not_a_change() {
        let mut values = HashMap::new();
        values.insert("k".to_string(), json!("a"));
        let mut s = MemorySession::from_values(values);
        s.set("k", json!("a")).unwrap();
        assert!(!s.is_dirty());
    }

    #[test]
    fn registry_commit_and_load() {
        let reg = SessionRegistry::default();
        let sid = reg.commit(None, &with_key("AUTH_UNIQUE_ID", json!(42))).unwrap().expect("stored");
        let loaded = reg.load(&sid).expect("session present");
        assert_eq!(loaded.get("AUTH_UNIQUE_ID").unwrap(), Some(json!(42)));
        assert!(!loaded.is_dirty());
        assert_eq!(reg.commit(Some(sid.as_str()), &loaded).unwrap().as_deref(), Some(sid.as_str()));
        assert_eq!(reg.len(), 1);
        assert!(reg.remove(&sid));
        assert!(reg.load(&sid).is_none());
    }

    #[test]
    fn empty_result_is_not_stored() {
        let reg = SessionRegistry::default();
        assert_eq!(reg.commit(None, &MemorySession::new()).unwrap(), None);
        assert!(reg.is_empty());

        let sid = reg.commit(None, &with_key("k", json!(1))).unwrap().unwrap();
        let mut s = reg.load(&sid).unwrap();
        s.delete("k").unwrap();
        assert_eq!(reg.commit(Some(sid.as_str()), &s).unwrap(), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn overlapping_writers_only_apply_their_own_keys() {
        let reg = SessionRegistry::default();
        let sid = reg.commit(None, &with_key("AUTH_UNIQUE_ID", json!(1))).unwrap().unwrap();

        // two requests load the same session before either finishes
        let mut slow = reg.load(&sid).unwrap();
        let mut signing_out = reg.load(&sid).unwrap();
        slow.set("theme", json!("dark")).unwrap();
        signing_out.delete("AUTH_UNIQUE_ID").unwrap();

        assert_eq!(reg.commit(Some(sid.as_str()), &signing_out).unwrap(), None);
        reg.commit(Some(sid.as_str()), &slow).unwrap();

        let after = reg.load(&sid).expect("theme kept");
        assert_eq!(after.get("AUTH_UNIQUE_ID").unwrap(), None);
        assert_eq!(after.get("theme").unwrap(), Some(json!("dark")));
    }

    #[test]
    fn renew_moves_contents_to_a_new_id() {
        let reg = SessionRegistry::default();
        let old = reg.commit(None, &with_key("theme", json!("dark"))).unwrap().unwrap();
        let mut s = reg.load(&old).unwrap();
        s.renew().unwrap();
        s.set("AUTH_UNIQUE_ID", json!(7)).unwrap();

        let new = reg.commit(Some(old.as_str()), &s).unwrap().unwrap();
        assert_ne!(new, old);
        assert!(reg.load(&old).is_none());
        let moved = reg.load(&new).unwrap();
        assert_eq!(moved.get("theme").unwrap(), Some(json!("dark")));
        assert_eq!(moved.get("AUTH_UNIQUE_ID").unwrap(), Some(json!(7)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let reg = SessionRegistry::new(Duration::ZERO);
        let sid = reg.commit(None, &with_key("k", json!(1))).unwrap().unwrap();
        assert!(reg.load(&sid).is_none());
        assert!(reg.is_empty());

        reg.commit(None, &with_key("k", json!(1))).unwrap();
        reg.commit(None, &with_key("k", json!(2))).unwrap();
        assert_eq!(reg.sweep_expired(), 2);
    }

    #[test]
    fn loading_extends_expiry() {
        let reg = SessionRegistry::new(Duration::from_millis(1000));
        let sid = reg.commit(None, &with_key("k", json!(1))).unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(600));
        assert!(reg.load(&sid).is_some());
        std::thread::sleep(Duration::from_millis(600));
        assert!(reg.load(&sid).is_some(), "active session expired at its original deadline");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = gen_id().unwrap();
        let b = gen_id().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn random_source_failure_yields_no_id() {
        let err = id_from(|_| Err(getrandom::Error::UNSUPPORTED)).unwrap_err();
        assert!(matches!(err, SessionError::IdGeneration(_)));
    }
}
