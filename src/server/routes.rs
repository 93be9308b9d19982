//! Request handlers.
//!
//! Handlers only translate between HTTP and the core: they resolve the
//! client identity, call one core operation and map its result onto the
//! response shapes below.

use super::identity::ClientIdentity;
use crate::errors::KeygateError;
use crate::manager::Keygate;
use crate::protocol::models::{
    non_blank, CallbackQuery, ErrorResponse, GenerateKeysRequest, GenerateKeysResponse,
    GenerateLinkResponse, LogsQuery, RedeemErrorResponse, RedeemRequest, RedeemResponse,
    SuccessResponse, ValidateRequest, ValidateResponse,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::{error, warn};

/// Header carrying the client's hardware id on redemption.
pub const HWID_HEADER: &str = "x-hwid";

/// Default page size of the admin log listing.
const DEFAULT_LOG_LIMIT: usize = 100;

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
        .into_response()
}

pub(super) async fn generate_link(
    State(keygate): State<Arc<Keygate>>,
    ClientIdentity(ip): ClientIdentity,
) -> Response {
    match keygate.issuance().request_link(&ip) {
        Ok(request) => Json(GenerateLinkResponse {
            link_id: request.link_id,
            monetized_url: request.monetized_url,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to generate link");
            internal_error("Failed to generate link")
        }
    }
}

pub(super) async fn provider_callback(
    State(keygate): State<Arc<Keygate>>,
    ClientIdentity(ip): ClientIdentity,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let outcome = keygate
        .issuance()
        .handle_external_callback(query.link_id.as_deref(), &ip);
    let location = outcome.redirect_url(keygate.issuance().public_base());
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn redeem_error(e: &KeygateError) -> Response {
    let status = match e {
        KeygateError::IpMismatch { .. } => StatusCode::FORBIDDEN,
        KeygateError::NotFound
        | KeygateError::NotCompleted
        | KeygateError::Expired
        | KeygateError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!(error = %e, "redemption failed");
            return internal_error("Verification failed");
        }
    };
    let restart = e.is_bypass_attempt() || matches!(e, KeygateError::NotFound | KeygateError::Expired);
    (
        status,
        Json(RedeemErrorResponse {
            error: e.public_message().to_string(),
            restart,
        }),
    )
        .into_response()
}

pub(super) async fn verify_completion(
    State(keygate): State<Arc<Keygate>>,
    ClientIdentity(ip): ClientIdentity,
    headers: HeaderMap,
    body: Result<Json<RedeemRequest>, JsonRejection>,
) -> Response {
    let link_id = body.ok().and_then(|Json(request)| request.link_id);
    let Some(link_id) = non_blank(link_id.as_deref()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(RedeemErrorResponse {
                error: "Link ID is required".to_string(),
                restart: false,
            }),
        )
            .into_response();
    };
    let hwid = non_blank(
        headers
            .get(HWID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );

    match keygate.issuance().redeem(link_id, &ip, hwid) {
        Ok(record) => Json(RedeemResponse { key: record.key }).into_response(),
        Err(e) => redeem_error(&e),
    }
}

pub(super) async fn verify_key(
    State(keygate): State<Arc<Keygate>>,
    ClientIdentity(ip): ClientIdentity,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let Some(key) = non_blank(request.key.as_deref()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidateResponse::rejected("Key is required")),
        )
            .into_response();
    };
    let hwid = non_blank(request.hwid.as_deref());

    match keygate.validation().validate(key, &ip, hwid) {
        Ok(validated) => Json(ValidateResponse::success(validated.usage_count)).into_response(),
        Err(e) if e.is_rejection() => {
            Json(ValidateResponse::rejected(e.public_message())).into_response()
        }
        Err(e) => {
            error!(error = %e, "validation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidateResponse::rejected("Verification failed")),
            )
                .into_response()
        }
    }
}

fn admin_error(e: KeygateError) -> Response {
    match e {
        KeygateError::InvalidKey => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Key not found")),
        )
            .into_response(),
        KeygateError::InvalidRequest(message) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
        }
        e => {
            error!(error = %e, "admin operation failed");
            internal_error("Internal error")
        }
    }
}

pub(super) async fn list_keys(State(keygate): State<Arc<Keygate>>) -> Response {
    match keygate.admin().list_keys() {
        Ok(keys) => Json(keys).into_response(),
        Err(e) => admin_error(e),
    }
}

pub(super) async fn delete_key(
    State(keygate): State<Arc<Keygate>>,
    Path(key): Path<String>,
) -> Response {
    match keygate.admin().delete(&key) {
        Ok(()) => Json(SuccessResponse { success: true }).into_response(),
        Err(e) => admin_error(e),
    }
}

pub(super) async fn revoke_key(
    State(keygate): State<Arc<Keygate>>,
    Path(key): Path<String>,
) -> Response {
    match keygate.admin().revoke(&key) {
        Ok(record) => Json(record).into_response(),
        Err(e) => admin_error(e),
    }
}

pub(super) async fn usage_logs(
    State(keygate): State<Arc<Keygate>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    match keygate
        .admin()
        .logs(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))
    {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => admin_error(e),
    }
}

pub(super) async fn analytics(State(keygate): State<Arc<Keygate>>) -> Response {
    match keygate.admin().analytics() {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => admin_error(e),
    }
}

pub(super) async fn generate_keys(
    State(keygate): State<Arc<Keygate>>,
    body: Result<Json<GenerateKeysRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "malformed generate-keys body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid request body")),
            )
                .into_response();
        }
    };

    match keygate
        .admin()
        .generate_keys(request.count.unwrap_or(0), request.expiry_days)
    {
        Ok(keys) => Json(GenerateKeysResponse {
            success: true,
            count: keys.len(),
            keys: keys.into_iter().map(|k| k.key).collect(),
        })
        .into_response(),
        Err(KeygateError::GeneratorFailure(e)) => {
            error!(error = %e, "bulk generation failed");
            internal_error("Failed to generate keys")
        }
        Err(e) => admin_error(e),
    }
}
