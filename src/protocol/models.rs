//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

/// Generic error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error.
    pub error: String,
}

impl ErrorResponse {
    /// Build an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// `POST /api/generate-link` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLinkResponse {
    /// Pending link id.
    pub link_id: String,
    /// Provider URL to send the client to.
    pub monetized_url: String,
}

/// Query string of the provider callback.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackQuery {
    /// Pending link id, echoed back by the provider.
    #[serde(default)]
    pub link_id: Option<String>,
}

/// `POST /api/verify-completion` request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    /// Completed pending link id.
    #[serde(default)]
    pub link_id: Option<String>,
}

/// `POST /api/verify-completion` success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemResponse {
    /// The minted license key.
    pub key: String,
}

/// `POST /api/verify-completion` failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemErrorResponse {
    /// Human-readable error.
    pub error: String,
    /// Whether the client must restart the flow instead of retrying.
    pub restart: bool,
}

/// `POST /api/verify-key` request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidateRequest {
    /// License key to validate.
    #[serde(default)]
    pub key: Option<String>,
    /// Hardware id of the calling machine.
    #[serde(default)]
    pub hwid: Option<String>,
}

/// `POST /api/verify-key` response, for success and rejection alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Whether the key is valid.
    pub valid: bool,

    /// Success message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Usage count after this validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u64>,

    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateResponse {
    /// A successful validation.
    pub fn success(usage_count: u64) -> Self {
        Self {
            valid: true,
            message: Some("Key verified successfully".to_string()),
            usage_count: Some(usage_count),
            error: None,
        }
    }

    /// A rejected validation.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: None,
            usage_count: None,
            error: Some(error.into()),
        }
    }
}

/// `POST /api/admin/generate-keys` request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeysRequest {
    /// Number of keys to mint.
    #[serde(default)]
    pub count: Option<i64>,
    /// Days until the minted keys expire.
    #[serde(default)]
    pub expiry_days: Option<u32>,
}

/// `POST /api/admin/generate-keys` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateKeysResponse {
    /// Always true on success.
    pub success: bool,
    /// Number of keys minted.
    pub count: usize,
    /// The minted keys.
    pub keys: Vec<String>,
}

/// Acknowledgement body for admin mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Always true.
    pub success: bool,
}

/// Query string of `GET /api/admin/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    /// Maximum entries to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Trim an optional client-supplied string, treating blank as absent.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
