use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::AppState;

/// Coarse authorization roles. Managers and admins share the elevated
/// permission set; members may only act on their own reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Manager,
    Admin,
}

impl Role {
    /// Managers and admins both pass elevated-permission checks.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_elevated()
    }
}

/// What the booking engine knows about a user: the authorization role
/// plus the addressing fields notifications need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub role: Role,
    pub email: String,
    pub display_name: String,
}

/// Resolves a user ID to its profile. This is the only question the
/// booking engine ever asks of the identity system.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> Result<UserProfile, ServiceError>;

    async fn role_of(&self, user_id: Uuid) -> Result<Role, ServiceError> {
        Ok(self.resolve(user_id).await?.role)
    }
}

/// Role assignments loaded once from configuration. Unknown users
/// default to the member role.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    admins: HashSet<Uuid>,
    managers: HashSet<Uuid>,
}

impl StaticIdentityProvider {
    pub fn new(admins: HashSet<Uuid>, managers: HashSet<Uuid>) -> Self {
        Self { admins, managers }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            admins: parse_id_list(cfg.admin_user_ids.as_deref()),
            managers: parse_id_list(cfg.manager_user_ids.as_deref()),
        }
    }
}

fn parse_id_list(raw: Option<&str>) -> HashSet<Uuid> {
    raw.map(|s| {
        s.split(',')
            .filter_map(|part| Uuid::parse_str(part.trim()).ok())
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let role = if self.admins.contains(&user_id) {
            Role::Admin
        } else if self.managers.contains(&user_id) {
            Role::Manager
        } else {
            Role::Member
        };

        // The static provider has no user directory; it derives a stable
        // address and name from the ID, which suits development and tests.
        Ok(UserProfile {
            role,
            email: format!("{}@users.rentstock.local", user_id),
            display_name: format!("user {}", user_id),
        })
    }
}

/// Header carrying the caller's user ID, set by the authenticating proxy.
pub const ACTOR_HEADER: &str = "x-actor-id";

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Forbidden(format!("missing {} header", ACTOR_HEADER))
            })?;

        let user_id = Uuid::parse_str(raw).map_err(|_| {
            ServiceError::ValidationError(format!("{} must be a UUID", ACTOR_HEADER))
        })?;

        let role = state.identity.role_of(user_id).await?;
        Ok(Actor::new(user_id, role))
    }
}
