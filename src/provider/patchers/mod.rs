mod gateway_class_patcher;
mod patcher;

pub use gateway_class_patcher::GatewayClassPatcher;
pub use patcher::{Operation, PatchContext, Patcher, MAX_STATUS_PATCH_ATTEMPTS};
