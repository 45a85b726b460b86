use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use etcdvalue_collector::TierError;
use etcdvalue_sources::TargetError;

/// Failures a scrape request can end in before any sample is written.
///
/// Scraper failures are not in here: they end up as observability samples
/// inside a normal 200 response.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    UnknownTier(#[from] TierError),

    #[error(transparent)]
    InvalidTarget(#[from] TargetError),

    #[error("encoding metrics: {0}")]
    Render(#[from] prometheus::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTier(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "scrape request failed");
        } else {
            warn!(error = %self, %status, "scrape request rejected");
        }
        (status, format!("{self}\n")).into_response()
    }
}
