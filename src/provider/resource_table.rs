use std::sync::Arc;

use dashmap::DashMap;
use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};

use crate::common::ResourceKey;

/// Keyed hand-off between the watchers that publish observed objects and the
/// consumers that read them. A read returns a value that was completely
/// written, or nothing.
pub trait ResourceStore<R>: Send + Sync {
    /// Inserts or replaces the value stored under `key`.
    fn put(&self, key: ResourceKey, value: Arc<R>);
    fn get(&self, key: &ResourceKey) -> Option<Arc<R>>;
    fn delete(&self, key: &ResourceKey) -> Option<Arc<R>>;
    fn list(&self) -> Vec<(ResourceKey, Arc<R>)>;
}

/// Sharded map per kind, so writers of different keys do not wait on one another.
#[derive(Clone, Default)]
pub struct ResourceTable {
    gateway_classes: Arc<DashMap<ResourceKey, Arc<GatewayClass>>>,
    gateways: Arc<DashMap<ResourceKey, Arc<Gateway>>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gateway_classes(&self) -> Arc<dyn ResourceStore<GatewayClass>> {
        Arc::new(self.clone())
    }

    pub fn gateways(&self) -> Arc<dyn ResourceStore<Gateway>> {
        Arc::new(self.clone())
    }
}

fn list<R>(map: &DashMap<ResourceKey, Arc<R>>) -> Vec<(ResourceKey, Arc<R>)> {
    let mut entries: Vec<_> = map.iter().map(|entry| (entry.key().clone(), Arc::clone(entry.value()))).collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));
    entries
}

impl ResourceStore<GatewayClass> for ResourceTable {
    fn put(&self, key: ResourceKey, value: Arc<GatewayClass>) {
        self.gateway_classes.insert(key, value);
    }

    fn get(&self, key: &ResourceKey) -> Option<Arc<GatewayClass>> {
        self.gateway_classes.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn delete(&self, key: &ResourceKey) -> Option<Arc<GatewayClass>> {
        self.gateway_classes.remove(key).map(|(_, value)| value)
    }

    fn list(&self) -> Vec<(ResourceKey, Arc<GatewayClass>)> {
        list(&self.gateway_classes)
    }
}

impl ResourceStore<Gateway> for ResourceTable {
    fn put(&self, key: ResourceKey, value: Arc<Gateway>) {
        self.gateways.insert(key, value);
    }

    fn get(&self, key: &ResourceKey) -> Option<Arc<Gateway>> {
        self.gateways.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn delete(&self, key: &ResourceKey) -> Option<Arc<Gateway>> {
        self.gateways.remove(key).map(|(_, value)| value)
    }

    fn list(&self) -> Vec<(ResourceKey, Arc<Gateway>)> {
        list(&self.gateways)
    }
}
