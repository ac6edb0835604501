use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A validated caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Request authentication capability.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the request's credentials, `None` when absent or wrong.
    fn authenticate(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Action authorization capability.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize(&self, identity: &Identity, action: &str) -> bool;
}

/// Static bearer-token authenticator.
///
/// With no token configured every authenticated route refuses access;
/// the public health endpoints are unaffected.
#[derive(Debug)]
pub struct TokenAuthenticator {
    token: Option<String>,
}

impl TokenAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Identity> {
        let expected = self.token.as_deref()?;
        let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
        let presented = header.strip_prefix("Bearer ")?;
        if presented == expected {
            Some(Identity {
                subject: "api-token".to_string(),
                roles: vec!["admin".to_string()],
            })
        } else {
            None
        }
    }
}

/// Role-based authorizer: every admin action requires the `admin` role.
#[derive(Debug, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn authorize(&self, identity: &Identity, _action: &str) -> bool {
        identity.has_role("admin")
    }
}

/// Fixed-window rate limiter keyed by `(route, subject)`.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// The admin default: 5 requests per 15 minutes.
    pub fn admin_default() -> Self {
        Self::new(5, Duration::minutes(15))
    }

    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Counts the request; returns false once the window's budget is
    /// spent.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock();
        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.signed_duration_since(entry.0) > self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_requests
    }
}

/// `^[a-zA-Z0-9_-]+$` without pulling in a regex engine.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
