mod resources;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Service, ServiceAccount},
};
use kube::{
    api::{DeleteParams, PostParams},
    Api, Client, ResourceExt,
};
use tokio::{sync::Mutex, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use typed_builder::TypedBuilder;

pub use self::resources::{labels, ManagedResource, Resources, ENVOY_CONTAINER_NAME};
use super::{InfraError, InfraManager};
use crate::ir::{validate_proxy_infra, Infra, ProxyInfra};

/// Created by the platform in every namespace.
const BUILTIN_SERVICE_ACCOUNT: &str = "default";

/// The snapshot of managed objects. The lock is only ever taken inside these
/// accessors, callers get copies.
#[derive(Debug, Default)]
struct ResourcesCell(Mutex<Resources>);

impl ResourcesCell {
    async fn snapshot(&self) -> Resources {
        self.0.lock().await.clone()
    }

    async fn store<K: ManagedResource>(&self, object: K) {
        let mut resources = self.0.lock().await;
        *K::slot(&mut resources) = Some(object);
    }

    async fn clear(&self) {
        *self.0.lock().await = Resources::default();
    }
}

/// Ensures the service account, deployment and service of a proxy exist on
/// the cluster and match the infra. Every object observed or written is kept
/// in the [`Resources`] snapshot.
#[derive(TypedBuilder)]
pub struct Reconciler {
    client: Client,
    controller_name: String,
    request_timeout: Duration,
    #[builder(default)]
    shutdown: CancellationToken,
    #[builder(default, setter(skip))]
    resources: ResourcesCell,
}

impl Reconciler {
    pub async fn resources(&self) -> Resources {
        self.resources.snapshot().await
    }

    pub async fn ensure_service_account(&self, infra: &Infra) -> Result<(), InfraError> {
        self.ensure_with_retry::<ServiceAccount>(&infra.proxy_infra()).await
    }

    pub async fn ensure_deployment(&self, infra: &Infra) -> Result<(), InfraError> {
        self.ensure_with_retry::<Deployment>(&infra.proxy_infra()).await
    }

    pub async fn ensure_service(&self, infra: &Infra) -> Result<(), InfraError> {
        self.ensure_with_retry::<Service>(&infra.proxy_infra()).await
    }

    /// A conflict means someone else wrote in between, so the object is read
    /// again and ensured one more time.
    async fn ensure_with_retry<K: ManagedResource>(&self, proxy: &ProxyInfra) -> Result<(), InfraError> {
        let span = info_span!("Reconciler", kind = %K::kind(&()), namespace = %proxy.namespace, name = %K::managed_name(proxy));
        async {
            match self.ensure::<K>(proxy).await {
                Err(e) if e.is_conflict() => {
                    debug!("conflict {e}, retrying once");
                    self.ensure::<K>(proxy).await
                }
                res => res,
            }
        }
        .instrument(span)
        .await
    }

    async fn ensure<K: ManagedResource>(&self, proxy: &ProxyInfra) -> Result<(), InfraError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &proxy.namespace);
        let name = K::managed_name(proxy);
        let desired = K::desired(proxy);
        let post_params = PostParams {
            field_manager: Some(self.controller_name.clone()),
            ..Default::default()
        };

        let object = match self.call(api.get_opt(&name)).await? {
            None => {
                let created = self.call(api.create(&post_params, &desired)).await?;
                info!("created version {:?}", created.resource_version());
                created
            }
            Some(current) => {
                let merged = K::merge(&current, &desired);
                if merged == current {
                    debug!("up to date version {:?}", current.resource_version());
                    current
                } else {
                    let updated = self.call(api.replace(&name, &post_params, &merged)).await?;
                    info!("updated version {:?} -> {:?}", current.resource_version(), updated.resource_version());
                    updated
                }
            }
        };
        self.resources.store(object).await;
        Ok(())
    }

    async fn delete<K: ManagedResource>(&self, proxy: &ProxyInfra) -> Result<(), InfraError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &proxy.namespace);
        let name = K::managed_name(proxy);
        let kind = K::kind(&());
        match self.call(api.delete(&name, &DeleteParams::default())).await {
            Ok(_) => {
                debug!("Deleted {kind} {}/{name}", proxy.namespace);
                Ok(())
            }
            Err(InfraError::Kube(kube::Error::Api(e))) if e.code == 404 => {
                debug!("{kind} {}/{name} already gone", proxy.namespace);
                Ok(())
            }
            Err(e) => {
                warn!("Could not delete {kind} {}/{name} {e}", proxy.namespace);
                Err(e)
            }
        }
    }

    /// Bounds a platform call by the request timeout and the shutdown token.
    async fn call<T>(&self, request: impl Future<Output = Result<T, kube::Error>>) -> Result<T, InfraError> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(InfraError::Cancelled),
            res = timeout(self.request_timeout, request) => res.map_err(|_| InfraError::Timeout)?.map_err(InfraError::from),
        }
    }
}

#[async_trait]
impl InfraManager for Reconciler {
    async fn create_or_update_infra(&self, infra: &Infra) -> Result<(), InfraError> {
        let proxy = infra.proxy_infra();
        validate_proxy_infra(&proxy)?;
        info!("Reconciling proxy infra {}/{}", proxy.namespace, proxy.name);
        futures::try_join!(self.ensure_service_account(infra), self.ensure_deployment(infra), self.ensure_service(infra))?;
        Ok(())
    }

    /// Deletes the managed objects. A proxy named after the namespace's built-in
    /// `default` service account shares it with every other workload, so that
    /// account is left in place.
    async fn delete_infra(&self, infra: &Infra) -> Result<(), InfraError> {
        let proxy = infra.proxy_infra();
        info!("Deleting proxy infra {}/{}", proxy.namespace, proxy.name);
        let mut deletions = vec![self.delete::<Service>(&proxy).boxed(), self.delete::<Deployment>(&proxy).boxed()];
        if ServiceAccount::managed_name(&proxy) == BUILTIN_SERVICE_ACCOUNT {
            debug!("Keeping built-in ServiceAccount {}/{BUILTIN_SERVICE_ACCOUNT}", proxy.namespace);
        } else {
            deletions.push(self.delete::<ServiceAccount>(&proxy).boxed());
        }
        let results = futures::future::join_all(deletions).await;
        self.resources.clear().await;
        results.into_iter().collect()
    }
}
