//! Session-backed account resolution and access guards.
//! Keep the public surface thin and split implementation across sub-modules.

mod account;
mod session;
mod request_context;
mod resolver;
mod authenticator;
mod guard;
#[cfg(test)]
pub(crate) mod testing;

pub use account::Account;
pub use session::{SessionStore, SessionError, MemorySession, SessionRegistry};
pub use request_context::{RequestContext, AuthState};
pub use resolver::SessionResolver;
pub use authenticator::{authenticate_session, logout, update};
pub use guard::{Guard, GuardOutcome, redirect_target};
