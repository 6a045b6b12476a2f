use std::path::PathBuf;

use actix_web::error::BlockingError;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Errors that prevent the server from starting. These are never recovered
/// from; `main` logs them and exits.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Environment variable {0} is not set")]
    MissingVariable(&'static str),
    #[error("Directory {0:?} does not exist!")]
    MissingDirectory(PathBuf),
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Cannot use directory {path:?}. Wrong permissions! ({source})")]
    InaccessibleDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("libsodium could not be initialized")]
    Sodium,
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("File '{0}' not found in your upload dir.")]
    FileNotFound(String),
    #[error("'{0}' is not a valid file name")]
    InvalidFileName(String),
    #[error("'{0}' is not a valid login")]
    InvalidLogin(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("File '{0}' is too large")]
    FileTooLarge(String),
    #[error("Invalid credentials")]
    AuthenticationFailure,
    #[error("{0} already taken")]
    UniquenessViolation(&'static str),
    #[error("Could not generate an unused {0}")]
    IdentifierExhausted(&'static str),
    #[error("Download limit must not be negative, got {0}")]
    InvalidDownloadLimit(i32),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Invalid token")]
    TokenNotFound,
    #[error("This token has been revoked")]
    TokenRevoked,
    #[error("This token has reached its download limit")]
    DownloadLimitReached,
    #[error("Stored file {0} is missing")]
    StorageFileMissing(String),
    #[error("Password hashing failed")]
    PasswordHash,
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Migration(#[from] diesel_migrations::RunMigrationsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Blocking task was canceled")]
    Canceled,
}

impl From<BlockingError<ShareError>> for ShareError {
    fn from(error: BlockingError<ShareError>) -> Self {
        match error {
            BlockingError::Error(e) => e,
            BlockingError::Canceled => ShareError::Canceled,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ShareError {
    fn status_code(&self) -> StatusCode {
        match self {
            ShareError::FileNotFound(_)
            | ShareError::NotFound(_)
            | ShareError::TokenNotFound => StatusCode::NOT_FOUND,
            ShareError::InvalidFileName(_)
            | ShareError::InvalidLogin(_)
            | ShareError::InvalidInput(_)
            | ShareError::InvalidDownloadLimit(_) => StatusCode::BAD_REQUEST,
            ShareError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ShareError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            ShareError::UniquenessViolation(_) => StatusCode::CONFLICT,
            ShareError::TokenRevoked | ShareError::DownloadLimitReached => StatusCode::GONE,
            ShareError::IdentifierExhausted(_)
            | ShareError::StorageFileMissing(_)
            | ShareError::PasswordHash
            | ShareError::Database(_)
            | ShareError::Pool(_)
            | ShareError::Migration(_)
            | ShareError::Io(_)
            | ShareError::Canceled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            log::error!("{}", self);
            "Server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = HttpResponse::build(status);
        if let ShareError::AuthenticationFailure = self {
            response.header(header::WWW_AUTHENTICATE, "Basic realm=\"share-server\"");
        }
        response.json(ErrorBody { error: message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let error = ShareError::FileNotFound("missing.txt".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            error.to_string(),
            "File 'missing.txt' not found in your upload dir."
        );
    }

    #[test]
    fn authentication_failure_asks_for_basic_credentials() {
        let response = ShareError::AuthenticationFailure.error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let error = ShareError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ShareError::DownloadLimitReached.status_code(),
            StatusCode::GONE
        );
    }
}
