pub mod kubernetes;

use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::ir::{Infra, ProviderType, ValidationError};

#[derive(thiserror::Error, Debug)]
pub enum InfraError {
    #[error("invalid infra: {0}")]
    Validation(#[from] ValidationError),
    #[error("kubernetes api error {0}")]
    Kube(#[from] kube::Error),
    #[error("request timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

impl InfraError {
    /// True when the platform rejected a write because the object changed or already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, InfraError::Kube(kube::Error::Api(e)) if e.code == 409)
    }
}

/// Provisions the managed proxy infrastructure described by an [`Infra`].
#[async_trait]
pub trait InfraManager: Send + Sync {
    async fn create_or_update_infra(&self, infra: &Infra) -> Result<(), InfraError>;
    async fn delete_infra(&self, infra: &Infra) -> Result<(), InfraError>;
}

pub fn new_infra_manager(
    provider: ProviderType,
    client: Client,
    controller_name: &str,
    request_timeout: Duration,
    shutdown: CancellationToken,
) -> Box<dyn InfraManager> {
    match provider {
        ProviderType::Kubernetes => Box::new(
            kubernetes::Reconciler::builder()
                .client(client)
                .controller_name(controller_name.to_owned())
                .request_timeout(request_timeout)
                .shutdown(shutdown)
                .build(),
        ),
    }
}
