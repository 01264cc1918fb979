use actix_web::http::StatusCode;
use actix_web::{error::ResponseError, HttpResponse};
use serde::Serialize;
use thiserror::Error;

/// Service-level errors, one variant per Kinesis error code. The wire body is
/// always `{"__type": "<code>", "message": "<text>"}`.
#[derive(Debug, Clone, Error)]
pub enum KinesisError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    ResourceInUse(String),

    #[error("{0}")]
    LimitExceeded(String),

    #[error("{0}")]
    ProvisionedThroughputExceeded(String),

    #[error("{0}")]
    ExpiredIterator(String),

    #[error("{0}")]
    ExpiredNextToken(String),

    #[error("{0}")]
    KmsAccessDenied(String),

    #[error("{0}")]
    InternalFailure(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    #[serde(rename = "__type")]
    pub error_type: String,
    pub message: String,
}

impl KinesisError {
    pub fn code(&self) -> &'static str {
        match self {
            KinesisError::InvalidArgument(_) => "InvalidArgumentException",
            KinesisError::Validation(_) => "ValidationException",
            KinesisError::ResourceNotFound(_) => "ResourceNotFoundException",
            KinesisError::ResourceInUse(_) => "ResourceInUseException",
            KinesisError::LimitExceeded(_) => "LimitExceededException",
            KinesisError::ProvisionedThroughputExceeded(_) => {
                "ProvisionedThroughputExceededException"
            }
            KinesisError::ExpiredIterator(_) => "ExpiredIteratorException",
            KinesisError::ExpiredNextToken(_) => "ExpiredNextTokenException",
            KinesisError::KmsAccessDenied(_) => "KMSAccessDeniedException",
            KinesisError::InternalFailure(_) => "InternalFailure",
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_type: self.code().to_string(),
            message: self.message(),
        }
    }
}

impl ResponseError for KinesisError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.body())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            KinesisError::InvalidArgument(_)
            | KinesisError::Validation(_)
            | KinesisError::ResourceNotFound(_)
            | KinesisError::ResourceInUse(_)
            | KinesisError::LimitExceeded(_)
            | KinesisError::ExpiredIterator(_)
            | KinesisError::ExpiredNextToken(_)
            | KinesisError::KmsAccessDenied(_) => StatusCode::BAD_REQUEST,
            // Throughput overruns surface with the bandwidth-exceeded status.
            KinesisError::ProvisionedThroughputExceeded(_) => {
                StatusCode::from_u16(509).unwrap_or(StatusCode::BAD_REQUEST)
            }
            KinesisError::InternalFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for KinesisError {
    fn from(err: serde_json::Error) -> KinesisError {
        KinesisError::InternalFailure(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for KinesisError {
    fn from(err: std::io::Error) -> KinesisError {
        KinesisError::InternalFailure(format!("I/O error: {}", err))
    }
}
