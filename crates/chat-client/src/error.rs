//! Client errors

use chat_common::{AppError, ConfigError};
use chat_gateway::{GatewayError, RouterError};
use chat_rest::RestError;
use thiserror::Error;

/// Errors raised while building or driving a [`Client`](crate::Client)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Rest(e) => e.into(),
            ClientError::Gateway(e) => e.into(),
            // Handler needs an intent the session does not identify with
            ClientError::Router(e) => {
                AppError::Config(ConfigError::InvalidValue("GATEWAY_INTENTS", e.to_string()))
            }
        }
    }
}
