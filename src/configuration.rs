use std::{path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use typed_builder::TypedBuilder;

use crate::{
    ir::{Infra, ProviderType, ProxyInfra},
    Result,
};

pub const DEFAULT_CONTROLLER_NAME: &str = "gateway.envoyproxy.io/gatewayclass-controller";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.to_owned()
}

fn default_request_timeout_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

#[derive(Clone, Debug, TypedBuilder, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KubernetesProviderConfiguration {
    #[builder(default = DEFAULT_REQUEST_TIMEOUT_SECONDS)]
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for KubernetesProviderConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Debug, Default, TypedBuilder, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfiguration {
    #[builder(default)]
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    #[builder(default)]
    #[serde(default)]
    pub kubernetes: KubernetesProviderConfiguration,
}

/// Overrides for the managed proxy, unset fields keep their defaults.
#[derive(Clone, Debug, Default, TypedBuilder, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfiguration {
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub namespace: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub image: Option<String>,
}

#[derive(Clone, Debug, TypedBuilder, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[builder(default = default_controller_name(), setter(into))]
    #[serde(default = "default_controller_name")]
    pub controller_name: String,
    #[builder(default)]
    #[serde(default)]
    pub provider: ProviderConfiguration,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub proxy: Option<ProxyConfiguration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("kubernetes request timeout must be greater than zero")]
    RequestTimeout,
}

impl Configuration {
    /// Reads the configuration file, or falls back to the defaults when there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let configuration: Configuration = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
                info!("Loaded configuration from {}", path.display());
                Ok(configuration)
            }
            None => {
                info!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.provider.kubernetes.request_timeout_seconds == 0 {
            return Err(ConfigurationError::RequestTimeout.into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.kubernetes.request_timeout_seconds)
    }

    pub fn infra(&self) -> Infra {
        let proxy = self.proxy.clone().unwrap_or_default();
        Infra {
            provider: Some(self.provider.provider_type),
            proxy: Some(
                ProxyInfra {
                    name: proxy.name.unwrap_or_default(),
                    namespace: proxy.namespace.unwrap_or_default(),
                    image: proxy.image.unwrap_or_default(),
                    ..Default::default()
                }
                .with_defaults(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ir::{DEFAULT_PROXY_IMAGE, DEFAULT_PROXY_NAME};

    #[test]
    fn test_empty_document_uses_defaults() {
        let configuration: Configuration = serde_yaml::from_str("{}").unwrap();
        assert_eq!(configuration, Configuration::default());
        assert_eq!(configuration.controller_name, DEFAULT_CONTROLLER_NAME);
        assert_eq!(configuration.request_timeout(), Duration::from_secs(30));
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.infra(), Infra::new());
    }

    #[test]
    fn test_full_document() {
        let yaml = r"
controller_name: example.com/gateway-controller
provider:
  type: Kubernetes
  kubernetes:
    request_timeout_seconds: 5
proxy:
  namespace: envoy-gateway-system
  image: envoyproxy/envoy:v1.31
";
        let configuration: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.controller_name, "example.com/gateway-controller");
        assert_eq!(configuration.request_timeout(), Duration::from_secs(5));

        let proxy = configuration.infra().proxy_infra();
        assert_eq!(proxy.name, DEFAULT_PROXY_NAME);
        assert_eq!(proxy.namespace, "envoy-gateway-system");
        assert_eq!(proxy.image, "envoyproxy/envoy:v1.31");
        assert_eq!(proxy.ports().count(), 2);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Configuration>("controller_nme: typo").is_err());
        assert!(serde_yaml::from_str::<Configuration>("provider:\n  type: Nomad").is_err());
    }

    #[test]
    fn test_validation() {
        let configuration = Configuration::builder().controller_name("").build();
        assert!(configuration.validate().is_err());

        let configuration = Configuration::builder()
            .provider(ProviderConfiguration::builder().kubernetes(KubernetesProviderConfiguration::builder().request_timeout_seconds(0).build()).build())
            .build();
        assert!(configuration.validate().is_err());

        let configuration = Configuration::builder().proxy(ProxyConfiguration::builder().name("edge").build()).build();
        assert!(configuration.validate().is_ok());
        let proxy = configuration.infra().proxy_infra();
        assert_eq!(proxy.object_name(), "envoy-edge");
        assert_eq!(proxy.image, DEFAULT_PROXY_IMAGE);
    }

    #[test]
    fn test_load() {
        assert_eq!(Configuration::load(None).unwrap(), Configuration::default());

        let path = std::env::temp_dir().join(format!("envoy-gateway-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"controller_name: [not, a, string]\n").unwrap();
        drop(file);
        assert!(Configuration::load(Some(&path)).is_err());

        std::fs::write(&path, "controller_name: example.com/gateway-controller\n").unwrap();
        assert_eq!(Configuration::load(Some(&path)).unwrap().controller_name, "example.com/gateway-controller");
        std::fs::remove_file(&path).unwrap();

        assert!(Configuration::load(Some(Path::new("/nonexistent/envoy-gateway.yaml"))).is_err());
    }
}
