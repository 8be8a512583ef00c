use std::fmt::Display;

use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};
use kube::{Resource, ResourceExt};

pub const DEFAULT_GROUP_NAME: &str = "gateway.networking.k8s.io";
pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const GATEWAY_CLASS_KIND_NAME: &str = "GatewayClass";
pub const GATEWAY_KIND_NAME: &str = "Gateway";

/// Identity of an observed object: group and kind plus namespace and name.
/// Cluster scoped objects carry an empty namespace.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn gateway_class(name: &str) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: String::new(),
            name: name.to_owned(),
            kind: GATEWAY_CLASS_KIND_NAME.to_owned(),
        }
    }

    pub fn gateway(name: &str, namespace: &str) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: GATEWAY_KIND_NAME.to_owned(),
        }
    }
}

pub fn create_id(name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        name.to_owned()
    } else {
        namespace.to_owned() + "." + name
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, create_id(&self.name, &self.namespace))
    }
}

impl From<&GatewayClass> for ResourceKey {
    fn from(value: &GatewayClass) -> Self {
        Self::gateway_class(&value.name_any())
    }
}

impl From<&Gateway> for ResourceKey {
    fn from(value: &Gateway) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self::gateway(&value.name_any(), &namespace)
    }
}
