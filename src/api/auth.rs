use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::api::rest::ApiState;
use crate::config::AuthConfig;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    Delete,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "delete" => Ok(Permission::Delete),
            "admin" => Ok(Permission::Admin),
            other => Err(Error::Config(format!("unknown permission: {}", other))),
        }
    }
}

/// Resolved identity for one request: user id plus the permission set the
/// API key carries. Recomputed per request, never persisted.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: String,
    permissions: HashSet<Permission>,
}

impl Principal {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Outcome of token resolution, stored in request extensions by the auth
/// middleware. `None` means no Authorization header was sent.
#[derive(Clone, Debug, Default)]
pub struct AuthContext(pub Option<Principal>);

impl AuthContext {
    /// Gate an operation on a permission: 401 without a principal, 403
    /// when the principal lacks the permission.
    pub fn require(&self, permission: Permission) -> Result<&Principal> {
        let principal = self.0.as_ref().ok_or(Error::Unauthorized)?;
        if !principal.has(permission) {
            warn!(
                "User {} attempted to access {} without permission",
                principal.user,
                permission.as_str()
            );
            return Err(Error::Forbidden(permission.as_str().to_string()));
        }
        Ok(principal)
    }
}

/// Static API-key table, built once at startup from configuration.
pub struct AuthGate {
    keys: HashMap<String, Principal>,
}

impl AuthGate {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut keys = HashMap::new();
        for entry in &config.api_keys {
            let mut permissions = HashSet::new();
            for p in &entry.permissions {
                permissions.insert(Permission::parse(p)?);
            }
            keys.insert(
                entry.key.clone(),
                Principal {
                    user: entry.user.clone(),
                    permissions,
                },
            );
        }
        Ok(AuthGate { keys })
    }

    pub fn resolve(&self, token: &str) -> Option<&Principal> {
        self.keys.get(token)
    }
}

/// Short SHA-256 fingerprint so rejected tokens can be correlated in logs
/// without ever logging the raw key.
fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Resolve the bearer token into an `AuthContext`. A missing header is
/// recorded as "no principal" and left for the handler's permission check;
/// a present-but-unknown token is rejected outright.
pub async fn authenticate(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let context = match header {
        None => AuthContext(None),
        Some(value) => {
            let token = value.strip_prefix("Bearer ").ok_or(Error::Unauthorized)?;
            match state.auth.resolve(token) {
                Some(principal) => {
                    info!("Authenticated user: {}", principal.user);
                    AuthContext(Some(principal.clone()))
                }
                None => {
                    warn!("Invalid API key attempted: {}...", token_fingerprint(token));
                    return Err(Error::InvalidApiKey);
                }
            }
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        AuthGate::from_config(&AuthConfig::default()).unwrap()
    }

    fn context_for(token: &str) -> AuthContext {
        AuthContext(gate().resolve(token).cloned())
    }

    #[test]
    fn unknown_token_never_resolves() {
        assert!(gate().resolve("no-such-key").is_none());
        assert!(gate().resolve("").is_none());
    }

    #[test]
    fn missing_principal_is_unauthorized_for_every_permission() {
        let ctx = AuthContext(None);
        for permission in [
            Permission::Read,
            Permission::Write,
            Permission::Delete,
            Permission::Admin,
        ] {
            assert!(matches!(
                ctx.require(permission),
                Err(Error::Unauthorized)
            ));
        }
    }

    #[test]
    fn held_permissions_pass_and_missing_ones_forbid() {
        let ctx = context_for("demo-api-key-123");
        assert!(ctx.require(Permission::Read).is_ok());
        assert!(ctx.require(Permission::Write).is_ok());
        assert!(matches!(
            ctx.require(Permission::Delete),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            ctx.require(Permission::Admin),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn readonly_key_holds_read_only() {
        let ctx = context_for("readonly-api-key-789");
        assert!(ctx.require(Permission::Read).is_ok());
        assert!(ctx.require(Permission::Write).is_err());
    }

    #[test]
    fn admin_key_holds_all_tiers() {
        let ctx = context_for("admin-api-key-456");
        for permission in [
            Permission::Read,
            Permission::Write,
            Permission::Delete,
            Permission::Admin,
        ] {
            assert!(ctx.require(permission).is_ok());
        }
        assert_eq!(ctx.require(Permission::Admin).unwrap().user, "admin-user");
    }

    #[test]
    fn bad_permission_string_is_a_config_error() {
        let config = AuthConfig {
            api_keys: vec![crate::config::ApiKeyEntry {
                key: "k".to_string(),
                user: "u".to_string(),
                permissions: vec!["superuser".to_string()],
            }],
        };
        assert!(matches!(
            AuthGate::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = token_fingerprint("demo-api-key-123");
        let b = token_fingerprint("demo-api-key-123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, token_fingerprint("other"));
    }
}
