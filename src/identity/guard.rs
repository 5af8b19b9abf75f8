use tracing::debug;

use super::Account;
use crate::config::AuthConfig;

/// Access requirement placed in front of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    LoginRequired,
    AdminRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Requirement met; the pipeline continues untouched.
    Pass,
    /// Requirement failed; respond 302 to this target and stop.
    Redirect(String),
}

impl Guard {
    pub fn allows<A: Account>(&self, account: &A) -> bool {
        match self {
            Guard::LoginRequired => account.is_authenticated(),
            Guard::AdminRequired => account.is_authenticated() && account.is_admin(),
        }
    }

    pub fn login_url<'a>(&self, cfg: &'a AuthConfig) -> &'a str {
        match self {
            Guard::LoginRequired => cfg.redirect_url.as_str(),
            Guard::AdminRequired => cfg.admin_redirect_url.as_str(),
        }
    }

    pub fn check<A: Account>(&self, cfg: &AuthConfig, account: &A, path: &str) -> GuardOutcome {
        if self.allows(account) {
            return GuardOutcome::Pass;
        }
        let target = redirect_target(self.login_url(cfg), &cfg.redirect_param, path, cfg.encode_redirect_path);
        debug!(target: "sessionauth", guard = ?self, path, location = %target, "guard redirect");
        GuardOutcome::Redirect(target)
    }
}

/// `{login_url}?{param}={path}`. With `encode` the path is percent-encoded except for `/`.
pub fn redirect_target(login_url: &str, param: &str, path: &str, encode: bool) -> String {
    if encode {
        let escaped = urlencoding::encode(path).replace("%2F", "/");
        format!("{}?{}={}", login_url, param, escaped)
    } else {
        format!("{}?{}={}", login_url, param, path)
    }
}
