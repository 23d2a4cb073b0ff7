//! Authentication layers: admin Basic, registration Basic, and agent Bearer.
//!
//! Three disjoint credential roles, each enforced by comparing against the
//! configured secret or looking up a hashed token — no crate in the pack
//! implements HTTP Basic auth, so the `Authorization` header is parsed by
//! hand here.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use crate::error::ControllerError;
use crate::state::AppState;

fn parse_basic_auth(parts: &Parts) -> Option<(String, String)> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Marker extractor: the caller authenticated as the configured admin user.
pub struct AdminAuth;

impl<S> FromRequestParts<S> for AdminAuth
where
    AppState: FromRef<S>,
    S: Sync,
{
    type Rejection = ControllerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let (user, pass) = parse_basic_auth(parts).ok_or(ControllerError::Unauthorized)?;
        if user == app.config().admin_user && pass == app.config().admin_password {
            Ok(AdminAuth)
        } else {
            Err(ControllerError::Unauthorized)
        }
    }
}

/// Marker extractor: the caller authenticated as the shared registration
/// credential used only by `/register`.
pub struct AgentBasicAuth;

impl<S> FromRequestParts<S> for AgentBasicAuth
where
    AppState: FromRef<S>,
    S: Sync,
{
    type Rejection = ControllerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let (user, pass) = parse_basic_auth(parts).ok_or(ControllerError::Unauthorized)?;
        if user == app.config().agent_user && pass == app.config().agent_password {
            Ok(AgentBasicAuth)
        } else {
            Err(ControllerError::Unauthorized)
        }
    }
}

/// The authenticated agent's id, injected by a successful bearer-token
/// lookup. Handlers that need to know "which agent is this" extract this
/// type instead of re-parsing the header.
pub struct AgentIdentity(pub Uuid);

impl<S> FromRequestParts<S> for AgentIdentity
where
    AppState: FromRef<S>,
    S: Sync,
{
    type Rejection = ControllerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ControllerError::Unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ControllerError::Unauthorized)?;
        let agents = app.agents().lock().await;
        let agent = agents.find_by_token(token).ok_or(ControllerError::Unauthorized)?;
        Ok(AgentIdentity(agent.id))
    }
}
