pub mod common;
pub mod configuration;
pub mod infrastructure;
pub mod ir;
pub mod provider;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use crate::configuration::Configuration;
use crate::{
    infrastructure::new_infra_manager,
    ir::validate_infra,
    provider::{resource_table::ResourceTable, Provider},
};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// Runs the provider until `shutdown` is cancelled and reconciles the proxy
/// infrastructure once at startup.
pub async fn start(configuration: Configuration, shutdown: CancellationToken) -> Result<()> {
    info!("Envoy Gateway started {}", configuration.controller_name);
    let infra = configuration.infra();
    validate_infra(Some(&infra))?;

    let client = Client::try_default().await?;
    let resource_table = ResourceTable::new();

    let provider = Provider::builder()
        .client(client.clone())
        .controller_name(configuration.controller_name.clone())
        .resource_table(resource_table)
        .request_timeout(configuration.request_timeout())
        .build();
    let provider = tokio::spawn(provider.start(shutdown.clone()));

    let infra_manager = new_infra_manager(infra.provider(), client, &configuration.controller_name, configuration.request_timeout(), shutdown);
    match infra_manager.create_or_update_infra(&infra).await {
        Ok(()) => info!("Proxy infrastructure reconciled"),
        Err(e) => warn!("Unable to reconcile proxy infrastructure {e}"),
    }

    provider.await??;
    info!("Envoy Gateway stopped");
    Ok(())
}
