mod infra;
mod validation;

pub use infra::{
    new_proxy_listeners, Infra, ListenerPort, ProviderType, ProxyInfra, ProxyListener, DEFAULT_HTTPS_LISTENER_PORT, DEFAULT_HTTP_LISTENER_PORT,
    DEFAULT_PROXY_IMAGE, DEFAULT_PROXY_NAME, DEFAULT_PROXY_NAMESPACE,
};
pub use validation::{validate_infra, validate_proxy_infra, FieldError, ValidationError, MAX_PORT_NUMBER, MIN_PORT_NUMBER};
