use std::{collections::BTreeMap, fmt::Debug};

use itertools::Itertools;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServiceAccount, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
    NamespaceResourceScope,
};
use kube::{api::ObjectMeta, Resource};
use serde::{de::DeserializeOwned, Serialize};

use crate::ir::ProxyInfra;

pub const ENVOY_CONTAINER_NAME: &str = "envoy";
const PROXY_REPLICAS: i32 = 1;

/// Platform objects currently known for one proxy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub service_account: Option<ServiceAccount>,
    pub deployment: Option<Deployment>,
    pub service: Option<Service>,
}

/// A namespaced object kind reconciled from a [`ProxyInfra`].
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn managed_name(proxy: &ProxyInfra) -> String;

    fn desired(proxy: &ProxyInfra) -> Self;

    /// Current object with the fields we manage taken from `desired`. Identity
    /// and version metadata of `current` are kept.
    fn merge(current: &Self, desired: &Self) -> Self;

    fn slot(resources: &mut Resources) -> &mut Option<Self>;
}

pub fn labels(proxy: &ProxyInfra) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_owned(), "envoy".to_owned()),
        ("app.kubernetes.io/component".to_owned(), "proxy".to_owned()),
        ("app.kubernetes.io/managed-by".to_owned(), "envoy-gateway".to_owned()),
        ("gateway.envoyproxy.io/owning-proxy".to_owned(), proxy.name.clone()),
    ])
}

fn metadata(name: String, proxy: &ProxyInfra, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(proxy.namespace.clone()),
        labels,
        ..Default::default()
    }
}

/// Desired labels win, labels added by others are kept.
fn merge_labels(current: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(desired_labels) = &desired.labels {
        let labels = current.labels.get_or_insert_with(BTreeMap::new);
        labels.extend(desired_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl ManagedResource for ServiceAccount {
    fn managed_name(proxy: &ProxyInfra) -> String {
        proxy.name.clone()
    }

    fn desired(proxy: &ProxyInfra) -> Self {
        ServiceAccount {
            metadata: metadata(Self::managed_name(proxy), proxy, None),
            ..Default::default()
        }
    }

    fn merge(current: &Self, desired: &Self) -> Self {
        let mut merged = current.clone();
        merge_labels(&mut merged.metadata, &desired.metadata);
        merged
    }

    fn slot(resources: &mut Resources) -> &mut Option<Self> {
        &mut resources.service_account
    }
}

fn envoy_container(proxy: &ProxyInfra) -> Container {
    let ports = proxy
        .ports()
        .unique_by(|port| port.port)
        .map(|port| ContainerPort {
            name: Some(port.name.clone()),
            container_port: port.port,
            protocol: Some("TCP".to_owned()),
            ..Default::default()
        })
        .collect();
    Container {
        name: ENVOY_CONTAINER_NAME.to_owned(),
        image: Some(proxy.image.clone()),
        ports: Some(ports),
        ..Default::default()
    }
}

impl ManagedResource for Deployment {
    fn managed_name(proxy: &ProxyInfra) -> String {
        proxy.object_name()
    }

    fn desired(proxy: &ProxyInfra) -> Self {
        let labels = labels(proxy);
        Deployment {
            metadata: metadata(Self::managed_name(proxy), proxy, Some(labels.clone())),
            spec: Some(DeploymentSpec {
                replicas: Some(PROXY_REPLICAS),
                selector: LabelSelector {
                    match_expressions: None,
                    match_labels: Some(labels.clone()),
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(proxy.name.clone()),
                        containers: vec![envoy_container(proxy)],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn merge(current: &Self, desired: &Self) -> Self {
        let mut merged = current.clone();
        merge_labels(&mut merged.metadata, &desired.metadata);
        let Some(desired_spec) = &desired.spec else {
            return merged;
        };
        // The selector is immutable once created, so only the pod template is converged.
        let template = &mut merged.spec.get_or_insert_with(|| desired_spec.clone()).template;
        if let Some(desired_metadata) = &desired_spec.template.metadata {
            merge_labels(template.metadata.get_or_insert_with(ObjectMeta::default), desired_metadata);
        }
        if let Some(desired_pod) = &desired_spec.template.spec {
            let pod = template.spec.get_or_insert_with(|| desired_pod.clone());
            pod.service_account_name.clone_from(&desired_pod.service_account_name);
            for desired_container in &desired_pod.containers {
                match pod.containers.iter_mut().find(|container| container.name == desired_container.name) {
                    Some(container) => {
                        container.image.clone_from(&desired_container.image);
                        container.ports.clone_from(&desired_container.ports);
                    }
                    None => pod.containers.push(desired_container.clone()),
                }
            }
        }
        merged
    }

    fn slot(resources: &mut Resources) -> &mut Option<Self> {
        &mut resources.deployment
    }
}

impl ManagedResource for Service {
    fn managed_name(proxy: &ProxyInfra) -> String {
        proxy.object_name()
    }

    fn desired(proxy: &ProxyInfra) -> Self {
        let labels = labels(proxy);
        let ports = proxy
            .ports()
            .unique_by(|port| port.port)
            .map(|port| ServicePort {
                name: Some(port.name.clone()),
                port: port.port,
                protocol: Some("TCP".to_owned()),
                target_port: Some(IntOrString::Int(port.port)),
                ..Default::default()
            })
            .collect();
        Service {
            metadata: metadata(Self::managed_name(proxy), proxy, Some(labels.clone())),
            spec: Some(ServiceSpec {
                selector: Some(labels),
                ports: Some(ports),
                type_: Some("LoadBalancer".to_owned()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn merge(current: &Self, desired: &Self) -> Self {
        let mut merged = current.clone();
        merge_labels(&mut merged.metadata, &desired.metadata);
        let Some(desired_spec) = &desired.spec else {
            return merged;
        };
        let spec = merged.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_.clone_from(&desired_spec.type_);
        spec.selector.clone_from(&desired_spec.selector);
        let current_ports = spec.ports.take().unwrap_or_default();
        // Node ports are allocated by the platform and must survive an update.
        spec.ports = desired_spec.ports.as_ref().map(|ports| {
            ports
                .iter()
                .map(|port| ServicePort {
                    node_port: current_ports.iter().find(|current| current.port == port.port).and_then(|current| current.node_port),
                    ..port.clone()
                })
                .collect()
        });
        merged
    }

    fn slot(resources: &mut Resources) -> &mut Option<Self> {
        &mut resources.service
    }
}
