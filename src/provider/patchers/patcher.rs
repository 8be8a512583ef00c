use std::{fmt::Debug, future::Future, time::Duration};

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, span, warn, Instrument, Level, Span};

use crate::{common::ResourceKey, provider::ProviderError};

/// Status writes are retried this many times in total when the object changed underneath.
pub const MAX_STATUS_PATCH_ATTEMPTS: usize = 3;

pub enum Operation<R> {
    PatchStatus(PatchContext<R>),
}

pub struct PatchContext<R> {
    pub resource_key: ResourceKey,
    pub controller_name: String,
    pub response_sender: oneshot::Sender<Result<R, ProviderError>>,
    pub span: Span,
}

#[async_trait]
pub trait Patcher<R>: Send + Sync
where
    R: DeserializeOwned + Clone + Debug + Serialize,
    R: ResourceExt,
    R: Resource<DynamicType = ()>,
    R: Send + Sync + 'static,
{
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<R>>;
    fn api(&self, namespace: &str) -> Api<R>;
    fn request_timeout(&self) -> Duration;
    fn shutdown(&self) -> &CancellationToken;
    /// Status body to merge into `current`.
    fn status(&self, current: &R, controller_name: &str) -> serde_json::Value;

    async fn start(&mut self) -> crate::Result<()> {
        while let Some(event) = self.receiver().recv().await {
            match event {
                Operation::PatchStatus(PatchContext {
                    resource_key,
                    controller_name,
                    response_sender,
                    span,
                }) => {
                    let span = span!(parent: &span, Level::INFO, "PatcherService", resource = std::any::type_name::<R>(), operation = "PatchStatus", id = %resource_key);
                    let res = self.patch_status(&resource_key, &controller_name).instrument(span.clone()).await;
                    match &res {
                        Ok(patched) => span.in_scope(|| info!("patch status result ok version {:?}", patched.resource_version())),
                        Err(e) => span.in_scope(|| warn!("patch status failed {e}")),
                    }
                    let _ = response_sender.send(res);
                }
            }
        }
        info!("Patcher {} stopped", std::any::type_name::<R>());
        Ok(())
    }

    /// Reads the object and merges the new status guarded by the version just read,
    /// so a concurrent writer causes a conflict and a fresh attempt.
    async fn patch_status(&self, resource_key: &ResourceKey, controller_name: &str) -> Result<R, ProviderError> {
        let api = self.api(&resource_key.namespace);
        let patch_params = PatchParams {
            field_manager: Some(controller_name.to_owned()),
            ..Default::default()
        };
        let mut attempt = 1;
        loop {
            let current = bounded(self.shutdown(), self.request_timeout(), api.get(&resource_key.name)).await??;
            let patch = json!({
                "metadata": { "resourceVersion": current.resource_version() },
                "status": self.status(&current, controller_name),
            });
            match bounded(self.shutdown(), self.request_timeout(), api.patch_status(&resource_key.name, &patch_params, &Patch::Merge(&patch))).await? {
                Ok(patched) => return Ok(patched),
                Err(kube::Error::Api(e)) if e.code == 409 && attempt < MAX_STATUS_PATCH_ATTEMPTS => {
                    debug!("patch status conflict on attempt {attempt}, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Bounds a platform call by the request timeout and the shutdown token.
/// Api errors are handed back untouched for the caller to classify.
async fn bounded<T>(shutdown: &CancellationToken, request_timeout: Duration, request: impl Future<Output = Result<T, kube::Error>>) -> Result<Result<T, kube::Error>, ProviderError> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(ProviderError::Cancelled),
        res = timeout(request_timeout, request) => res.map_err(|_| ProviderError::Timeout),
    }
}
