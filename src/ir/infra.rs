use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROXY_NAME: &str = "default";
pub const DEFAULT_PROXY_NAMESPACE: &str = "default";
pub const DEFAULT_PROXY_IMAGE: &str = "envoyproxy/envoy-dev:latest";
pub const DEFAULT_HTTP_LISTENER_PORT: i32 = 80;
pub const DEFAULT_HTTPS_LISTENER_PORT: i32 = 443;

const OBJECT_NAME_PREFIX: &str = "envoy-";

/// Platforms able to host managed proxy infrastructure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[default]
    Kubernetes,
}

impl Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Kubernetes => f.write_str("Kubernetes"),
        }
    }
}

/// Managed infrastructure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Infra {
    pub provider: Option<ProviderType>,
    pub proxy: Option<ProxyInfra>,
}

/// Managed proxy infrastructure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProxyInfra {
    /// Name used for managed proxy infrastructure.
    pub name: String,
    /// Namespace of the managed proxy infrastructure, "default" when unset.
    pub namespace: String,
    /// User-facing proxy configuration, carried through untouched.
    pub config: Option<serde_json::Value>,
    /// Container image of the proxy.
    pub image: String,
    pub listeners: Vec<ProxyListener>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyListener {
    pub address: Option<String>,
    pub ports: Vec<ListenerPort>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerPort {
    pub name: String,
    pub port: i32,
}

impl ListenerPort {
    pub fn new(name: &str, port: i32) -> Self {
        Self { name: name.to_owned(), port }
    }
}

impl Infra {
    pub fn new() -> Self {
        Self {
            provider: Some(ProviderType::Kubernetes),
            proxy: Some(ProxyInfra::new()),
        }
    }

    pub fn provider(&self) -> ProviderType {
        self.provider.unwrap_or_default()
    }

    /// Returns a copy of the proxy infrastructure with every unset field defaulted.
    /// The receiver is left untouched.
    pub fn proxy_infra(&self) -> ProxyInfra {
        self.proxy.clone().map_or_else(ProxyInfra::new, ProxyInfra::with_defaults)
    }
}

impl ProxyInfra {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_PROXY_NAME.to_owned(),
            namespace: DEFAULT_PROXY_NAMESPACE.to_owned(),
            config: None,
            image: DEFAULT_PROXY_IMAGE.to_owned(),
            listeners: new_proxy_listeners(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.name.is_empty() {
            DEFAULT_PROXY_NAME.clone_into(&mut self.name);
        }
        if self.namespace.is_empty() {
            DEFAULT_PROXY_NAMESPACE.clone_into(&mut self.namespace);
        }
        if self.image.is_empty() {
            DEFAULT_PROXY_IMAGE.clone_into(&mut self.image);
        }
        if self.listeners.is_empty() {
            self.listeners = new_proxy_listeners();
        }
        self
    }

    /// Name shared by the deployment and service of this proxy.
    pub fn object_name(&self) -> String {
        if self.name.is_empty() {
            format!("{OBJECT_NAME_PREFIX}{DEFAULT_PROXY_NAME}")
        } else {
            format!("{OBJECT_NAME_PREFIX}{}", self.name)
        }
    }

    pub fn ports(&self) -> impl Iterator<Item = &ListenerPort> {
        self.listeners.iter().flat_map(|listener| listener.ports.iter())
    }
}

pub fn new_proxy_listeners() -> Vec<ProxyListener> {
    vec![ProxyListener {
        address: None,
        ports: vec![ListenerPort::new("http", DEFAULT_HTTP_LISTENER_PORT), ListenerPort::new("https", DEFAULT_HTTPS_LISTENER_PORT)],
    }]
}
