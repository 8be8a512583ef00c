use itertools::Itertools;
use thiserror::Error;

use super::{Infra, ProxyInfra};

pub const MIN_PORT_NUMBER: i32 = 1;
pub const MAX_PORT_NUMBER: i32 = 65535;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("name field required")]
    NameRequired,
    #[error("namespace field required")]
    NamespaceRequired,
    #[error("image field required")]
    ImageRequired,
    #[error("listener {listener}: ports field required")]
    ListenerPortsRequired { listener: usize },
    #[error("listener {listener} port {port}: name field required")]
    ListenerPortNameRequired { listener: usize, port: usize },
    #[error("listener {listener} port {port}: {value} is not a valid port number")]
    InvalidPortNumber { listener: usize, port: usize, value: i32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("infra ir is nil")]
    NilInfra,
    #[error("[{}]", .0.iter().join(", "))]
    Invalid(Vec<FieldError>),
}

impl ValidationError {
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ValidationError::NilInfra => &[],
            ValidationError::Invalid(errors) => errors,
        }
    }
}

fn aggregate(errors: Vec<FieldError>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Invalid(errors))
    }
}

pub fn validate_infra(infra: Option<&Infra>) -> Result<(), ValidationError> {
    let infra = infra.ok_or(ValidationError::NilInfra)?;
    match &infra.proxy {
        Some(proxy) => validate_proxy_infra(proxy),
        None => Ok(()),
    }
}

/// Collects every violated rule instead of stopping at the first one.
/// An empty listener list is valid.
pub fn validate_proxy_infra(proxy: &ProxyInfra) -> Result<(), ValidationError> {
    let mut errors = vec![];

    if proxy.name.is_empty() {
        errors.push(FieldError::NameRequired);
    }
    if proxy.namespace.is_empty() {
        errors.push(FieldError::NamespaceRequired);
    }
    if proxy.image.is_empty() {
        errors.push(FieldError::ImageRequired);
    }

    for (listener_index, listener) in proxy.listeners.iter().enumerate() {
        if listener.ports.is_empty() {
            errors.push(FieldError::ListenerPortsRequired { listener: listener_index });
        }
        for (port_index, port) in listener.ports.iter().enumerate() {
            if port.name.is_empty() {
                errors.push(FieldError::ListenerPortNameRequired {
                    listener: listener_index,
                    port: port_index,
                });
            }
            if !(MIN_PORT_NUMBER..=MAX_PORT_NUMBER).contains(&port.port) {
                errors.push(FieldError::InvalidPortNumber {
                    listener: listener_index,
                    port: port_index,
                    value: port.port,
                });
            }
        }
    }

    aggregate(errors)
}
