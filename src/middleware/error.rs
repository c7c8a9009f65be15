use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;
use crate::error_page::ErrorPage;

/// Rejection of [`RequestIdentity`](super::RequestIdentity).
#[derive(Debug, thiserror::Error)]
pub enum IdentityRejection {
    /// Neither a `client_id` query parameter nor an `oauth_client_id` cookie.
    #[error("Missing client_id parameter")]
    MissingClientId,
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        ErrorPage::new("invalid_request", self.to_string()).into_response()
    }
}

/// Lets handlers return `Result<_, openauthster::Error>` directly.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidClientId(_) | Self::ChallengeMissing | Self::StateMismatch => {
                StatusCode::BAD_REQUEST
            }
            Self::CallbackInProgress => StatusCode::CONFLICT,
            Self::OAuth { .. } | Self::Exchange(_) | Self::Refresh(_) | Self::SessionEndpoint { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => {
                tracing::error!(error = %self, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ErrorPage::from(&self).with_status(status).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_bad_request() {
        let response = IdentityRejection::MissingClientId.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            Error::NotAuthenticated("No token").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::StateMismatch.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::CallbackInProgress.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Exchange(Box::new(Error::Config("x".into())))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Store("disk".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
