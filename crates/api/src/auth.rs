//! Caller identity extracted from request headers.
//!
//! Authentication happens upstream; the gateway forwards the validated actor
//! id and role in `x-actor-id` and `x-actor-role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::ActorId;
use domain::{Action, CapabilitySet, Module, Role};

use crate::error::ApiError;

/// Header carrying the actor id.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the actor role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    capabilities: CapabilitySet,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self {
            id,
            role,
            capabilities: role.capabilities(),
        }
    }

    /// Fails with `403` unless the role grants the capability.
    pub fn require(&self, module: Module, action: Action) -> Result<(), ApiError> {
        if self.capabilities.allows(module, action) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not {action:?} {module:?}",
                self.role
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = ActorId::parse(header(parts, ACTOR_ID_HEADER)?)
            .map_err(|e| ApiError::Unauthorized(format!("invalid {ACTOR_ID_HEADER}: {e}")))?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|_| ApiError::Forbidden("unknown role".to_string()))?;
        Ok(Actor::new(id, role))
    }
}
