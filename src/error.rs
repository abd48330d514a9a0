use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::domain::Tier;
use crate::protocol::ErrorOut;

/// Caller bugs: inputs the engines refuse instead of clamping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("unlock threshold must be positive, got {0}")]
    NonPositiveThreshold(i64),

    #[error("score delta must not be negative, got {0}")]
    NegativeScoreDelta(i64),

    #[error("reward list is empty")]
    EmptyRewardList,

    #[error("reward magnitude must not be negative, got {0}")]
    NegativeReward(i64),

    #[error("{tier:?} spin limit must be positive, got {value}")]
    NonPositiveSpinLimit { tier: Tier, value: i64 },

    #[error("chapter count must be positive")]
    NoChapters,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("user {id} already exists")]
    AlreadyExists { id: String },

    #[error("concurrent update of user {id}: expected version {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("mirror error: {0}")]
    Mirror(String),
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Contract(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists { .. } | ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Mirror(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(target: "nst_backend", error = %self, "Request failed");
        } else {
            warn!(target: "nst_backend", error = %self, %status, "Request rejected");
        }
        (status, Json(ErrorOut { error: self.to_string() })).into_response()
    }
}
