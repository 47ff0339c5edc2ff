use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::debug;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Username already exists. Please choose another.")]
    DuplicateUsername,

    #[error("Please log in to continue.")]
    Unauthorized { login_url: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Could not reach {service}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} answered with status {status}")]
    Server {
        service: &'static str,
        status: u16,
    },

    #[error("Failed to update favorites. Please try again.")]
    FavoritesSync(#[source] Box<AppError>),

    #[error("Database error")]
    Storage(#[from] sled::Error),

    #[error("Encoding error")]
    Encoding(#[from] bincode::Error),

    #[error("Password hashing error")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    pub fn network(service: &'static str, source: reqwest::Error) -> Self {
        AppError::Network { service, source }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AppError::DuplicateUsername => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Network { .. } | AppError::Server { .. } | AppError::FavoritesSync(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Storage(_)
            | AppError::Encoding(_)
            | AppError::Hashing(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        debug!("{:?}", self);
        let mut body = json!({ "error": self.to_string() });
        if let AppError::Unauthorized { login_url } = self {
            body["login"] = json!(login_url);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
