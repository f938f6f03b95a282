use thiserror::Error;

use crate::infra::error::InfraError;

use super::flush::FlushError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Flush(#[from] FlushError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
