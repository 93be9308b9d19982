//! Client identity resolution at the HTTP boundary.

use crate::manager::Keygate;
use crate::protocol::models::ErrorResponse;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Client IP resolved once per request by the configured trust policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl FromRequestParts<Arc<Keygate>> for ClientIdentity {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<Keygate>,
    ) -> Result<Self, Self::Rejection> {
        let policy = &state.config().trust;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let forwarded = policy
            .forwarded_header
            .as_deref()
            .and_then(|name| parts.headers.get(name))
            .and_then(|value| value.to_str().ok());

        policy
            .resolve(peer, forwarded)
            .map(ClientIdentity)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Unable to determine client address")),
                )
            })
    }
}
