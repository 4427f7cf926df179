use crate::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use booking_engine::error::{BookingError, ErrorKind};
use tracing::{error, warn};

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BookingError);

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput | ErrorKind::AlreadyExists => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::PaymentFailed | ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::InvalidStatus | ErrorKind::StageNotApproved | ErrorKind::BookingNotFunded => {
            StatusCode::CONFLICT
        }
        ErrorKind::LedgerError => StatusCode::BAD_GATEWAY,
        ErrorKind::Transport | ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Config | ErrorKind::Serialization | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            error!(?kind, error = %self.0, "request failed");
        } else {
            warn!(?kind, error = %self.0, "request rejected");
        }

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            error_kind: Some(kind),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_maps_to_statuses() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AlreadyExists), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(ErrorKind::InsufficientFunds),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_for(ErrorKind::StageNotApproved), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::LedgerError), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::SERVICE_UNAVAILABLE);
    }
}
