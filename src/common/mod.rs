mod resource_key;

#[cfg(test)]
pub(crate) mod fake_api_server;

pub use resource_key::{create_id, ResourceKey};

pub const ACCEPTED_CONDITION_TYPE: &str = "Accepted";
pub const ACCEPTED_CONDITION_REASON: &str = "Accepted";
pub const CONDITION_STATUS_TRUE: &str = "True";
