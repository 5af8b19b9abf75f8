use super::Account;

/// How the resolver arrived at the bound account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No identity in the session.
    Anonymous,
    /// Session identity resolved and the account was logged in.
    Authenticated,
    /// Session held an identity that failed to resolve; the request runs as anonymous.
    Stale,
}

/// Per-request binding produced once by the resolver.
#[derive(Debug, Clone)]
pub struct RequestContext<A> {
    account: A,
    state: AuthState,
    request_id: String,
}

impl<A: Account> RequestContext<A> {
    pub(crate) fn bind(account: A, state: AuthState) -> Self {
        Self { account, state, request_id: uuid::Uuid::new_v4().to_string() }
    }

    pub fn account(&self) -> &A { &self.account }

    /// Mutable access for handlers that log the bound account in or out.
    pub fn account_mut(&mut self) -> &mut A { &mut self.account }

    pub fn into_account(self) -> A { self.account }

    pub fn state(&self) -> AuthState { self.state }

    pub fn request_id(&self) -> &str { &self.request_id }

    pub fn is_authenticated(&self) -> bool { self.account.is_authenticated() }
}
