use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Principal type supplied by the embedding application.
///
/// The resolver only ever starts from a zero-value account produced by the
/// application's factory and asks it to look up the real one via `get_by_id`.
/// `login`/`logout` flip the authenticated state and any derived data; they
/// must never change `unique_id`.
pub trait Account: Sized {
    /// Stable identifier stored in the session. Serialized to JSON there.
    type Id: Serialize + DeserializeOwned + PartialEq + Clone + Debug;
    /// Lookup error for a missing, deleted or unreadable account.
    type Error: std::error::Error + Send + Sync + 'static;

    fn is_authenticated(&self) -> bool;

    fn is_admin(&self) -> bool;

    /// Set any flags or extra data that should be available to a logged-in account.
    fn login(&mut self);

    /// Clear authenticated state and sensitive data.
    fn logout(&mut self);

    fn unique_id(&self) -> Self::Id;

    /// Load a fully populated account for `id`.
    fn get_by_id(&self, id: &Self::Id) -> Result<Self, Self::Error>;
}
