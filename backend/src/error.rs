use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::class_index::ClassIndexError;
use crate::fetcher::FetchError;
use crate::serving::PredictionError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    ClassIndex(#[from] ClassIndexError),
}

impl GatewayError {
    /// Message returned to the caller. Internal details stay in the logs.
    fn client_message(&self) -> String {
        match self {
            GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::Fetch(FetchError::Request(_)) => "Could not download image".to_string(),
            GatewayError::Fetch(e) => e.to_string(),
            GatewayError::Prediction(PredictionError::Connect { .. })
            | GatewayError::Prediction(PredictionError::InvalidEndpoint { .. }) => {
                "Cannot connect to inference server".to_string()
            }
            GatewayError::Prediction(_) => "Could not run prediction".to_string(),
            GatewayError::ClassIndex(ClassIndexError::NotFound(id)) => {
                format!("Class id {} not found", id)
            }
            GatewayError::ClassIndex(_) => "Class index unavailable".to_string(),
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Fetch(e) => match e {
                FetchError::InvalidUrl(_) | FetchError::UnsupportedScheme(_) => {
                    StatusCode::BAD_REQUEST
                }
                FetchError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
                FetchError::Request(_)
                | FetchError::UpstreamStatus(_)
                | FetchError::BadRedirect
                | FetchError::TooManyRedirects => StatusCode::BAD_GATEWAY,
                FetchError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                FetchError::NotAnImage => StatusCode::UNPROCESSABLE_ENTITY,
            },
            GatewayError::Prediction(_) | GatewayError::ClassIndex(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.client_message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_to_client_and_gateway_statuses() {
        let cases = [
            (
                GatewayError::Fetch(FetchError::UnsupportedScheme("ftp".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::Fetch(FetchError::HostNotAllowed("evil.test".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                GatewayError::Fetch(FetchError::UpstreamStatus(404)),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::Fetch(FetchError::TooLarge { limit: 10 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                GatewayError::Fetch(FetchError::NotAnImage),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn downstream_failures_are_internal_errors() {
        let rpc = GatewayError::from(PredictionError::Rpc(tonic::Status::unavailable("down")));
        assert_eq!(rpc.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rpc.client_message(), "Could not run prediction");

        let missing = GatewayError::from(ClassIndexError::NotFound(1000));
        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.client_message(), "Class id 1000 not found");
    }
}
