use thiserror::Error;

use crate::app_error::AppError;

/// Infrastructure errors that can occur during engine startup.
///
/// Display messages are sanitized and safe for logs/console output. Debug
/// output includes the full #[source] chain which may contain secrets (e.g.
/// connection strings), so use Display (%e) not Debug (?e) in logs.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("Database connection failed. Check DATABASE_URL and ensure the database is running.")]
    DatabaseConnection(#[source] sqlx::Error),

    #[error("Configuration error: environment variable {var} not set")]
    ConfigMissing { var: &'static str },

    #[error("Cipher initialization failed")]
    CipherInit(#[source] AppError),
}

impl From<sqlx::Error> for InfraError {
    fn from(e: sqlx::Error) -> Self {
        InfraError::DatabaseConnection(e)
    }
}
