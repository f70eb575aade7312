//! Caller identity resolution.
//!
//! The gateway does not run its own auth; it trusts an upstream proxy to
//! set `x-user-id`, and otherwise derives a stable pseudonymous id from
//! the bearer token so one token always owns the same conversations.

use sha2::{Digest, Sha256};

pub const ANONYMOUS_USER_ID: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    User(String),
    Anonymous,
}

impl Caller {
    /// Resolve from request headers, in precedence order:
    /// `x-user-id`, then a hash of the bearer token, then anonymous.
    pub fn resolve(x_user_id: Option<&str>, authorization: Option<&str>) -> Self {
        if let Some(id) = x_user_id {
            let id = id.trim();
            if !id.is_empty() {
                return Caller::User(id.to_string());
            }
        }

        if let Some(auth) = authorization {
            if let Some(token) = auth.trim().strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    let digest = Sha256::digest(token.as_bytes());
                    // 16 hex chars is plenty for a storage key.
                    return Caller::User(hex::encode(&digest[..8]));
                }
            }
        }

        Caller::Anonymous
    }

    pub fn user_id(&self) -> &str {
        match self {
            Caller::User(id) => id,
            Caller::Anonymous => ANONYMOUS_USER_ID,
        }
    }
}
