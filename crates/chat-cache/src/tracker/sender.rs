//! Change delivery seam
//!
//! Applying a change set hands it to an entity-specific [`ChangeSender`].
//! [`RestChangeSender`] covers the usual case of one REST call per apply.

use super::ChangeSet;
use async_trait::async_trait;
use chat_common::AppError;
use chat_core::{CoreError, FieldValue, Snowflake};
use chat_rest::{RestClient, RestError, RestRequest};
use thiserror::Error;

/// Why an apply failed; the edit has been rolled back in every case
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The entity was not in a state that allows applying
    #[error(transparent)]
    Entity(#[from] CoreError),

    /// The server answered with a non-success status
    #[error("Changes rejected ({status})")]
    Rejected { status: u16, body: String },

    /// The request failed before a usable response arrived
    #[error(transparent)]
    Request(#[from] RestError),
}

impl ApplyError {
    /// HTTP status of the failure, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Request(e) => e.status(),
            Self::Entity(_) => None,
        }
    }
}

impl From<ApplyError> for AppError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Entity(e) => AppError::Entity(e),
            ApplyError::Rejected { status, body } => AppError::Request { status, body },
            ApplyError::Request(e) => e.into(),
        }
    }
}

/// Sends a change set to the server
#[async_trait]
pub trait ChangeSender<V: FieldValue>: Send + Sync {
    /// Persist `changes` for entity `id`
    ///
    /// `reason` is the audit log reason given to `apply_changes`.
    async fn send(
        &self,
        id: Snowflake,
        changes: &ChangeSet<V>,
        reason: Option<&str>,
    ) -> Result<(), ApplyError>;
}

/// A sender that turns each change set into one REST request
///
/// The audit reason travels in the `X-Audit-Log-Reason` header.
pub struct RestChangeSender<F> {
    client: RestClient,
    build: F,
}

impl<F> RestChangeSender<F> {
    pub fn new(client: RestClient, build: F) -> Self {
        Self { client, build }
    }
}

#[async_trait]
impl<V, F> ChangeSender<V> for RestChangeSender<F>
where
    V: FieldValue,
    F: Fn(Snowflake, &ChangeSet<V>) -> RestRequest + Send + Sync,
{
    async fn send(
        &self,
        id: Snowflake,
        changes: &ChangeSet<V>,
        reason: Option<&str>,
    ) -> Result<(), ApplyError> {
        let mut request = (self.build)(id, changes);
        if let Some(reason) = reason {
            request = request.audit_reason(reason);
        }

        let response = self.client.execute(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(ApplyError::Rejected {
                status: response.status,
                body: response.body,
            })
        }
    }
}
