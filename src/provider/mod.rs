pub mod gateway;
pub mod gateway_class;
pub mod patchers;
pub mod resource_table;
pub mod state_machine;
pub mod watch;

use std::time::Duration;

use futures::FutureExt;
use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use typed_builder::TypedBuilder;

use self::{
    gateway::GatewayWatcher,
    gateway_class::GatewayClassWatcher,
    patchers::{GatewayClassPatcher, Patcher},
    resource_table::ResourceTable,
    watch::kube_events,
};

pub const REQUEUE_DELAY: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("kubernetes api error {0}")]
    Kube(#[from] kube::Error),
    #[error("request timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("status patcher is not running")]
    PatcherClosed,
}

/// Sent by the gateway class watcher whenever one of our classes is published or removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassEvent {
    Accepted(String),
    Removed(String),
}

impl ClassEvent {
    pub fn class_name(&self) -> &str {
        match self {
            ClassEvent::Accepted(name) | ClassEvent::Removed(name) => name,
        }
    }
}

/// Watches gateway classes and gateways and publishes ours into the resource table.
#[derive(TypedBuilder)]
pub struct Provider {
    client: Client,
    controller_name: String,
    resource_table: ResourceTable,
    request_timeout: Duration,
}

impl Provider {
    pub async fn start(self, shutdown: CancellationToken) -> crate::Result<()> {
        info!("Kubernetes provider started {}", self.controller_name);
        let (mut gateway_class_patcher, gateway_class_patcher_sender) = GatewayClassPatcher::new(self.client.clone(), self.request_timeout, shutdown.clone());
        let (class_event_sender, class_event_receiver) = mpsc::channel(1024);

        let gateway_class_watcher = GatewayClassWatcher::builder()
            .controller_name(self.controller_name.clone())
            .store(self.resource_table.gateway_classes())
            .patcher(gateway_class_patcher_sender)
            .class_events(class_event_sender)
            .build();

        let gateway_watcher = GatewayWatcher::builder()
            .gateway_classes(self.resource_table.gateway_classes())
            .store(self.resource_table.gateways())
            .class_events(class_event_receiver)
            .build();

        let gateway_class_events = kube_events(Api::<GatewayClass>::all(self.client.clone()));
        let gateway_events = kube_events(Api::<Gateway>::all(self.client.clone()));

        let services = vec![
            async move { gateway_class_patcher.start().await }.boxed(),
            gateway_class_watcher.run(gateway_class_events, shutdown.clone()).boxed(),
            gateway_watcher.run(gateway_events, shutdown).boxed(),
        ];
        let results = futures::future::join_all(services).await;
        info!("Kubernetes provider stopped");
        results.into_iter().collect::<crate::Result<Vec<()>>>().map(|_| ())
    }
}
