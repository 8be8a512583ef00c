use std::{collections::HashMap, sync::Arc};

use futures::{Stream, StreamExt};
use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};
use typed_builder::TypedBuilder;

use super::{
    resource_table::ResourceStore,
    state_machine::{Effect, Input, ObjectStates},
    watch::WatchEvent,
    ClassEvent,
};
use crate::common::ResourceKey;

/// Publishes the gateways whose class is accepted by us. Gateways seen before
/// their class is accepted are kept aside and re-evaluated on class changes.
#[derive(TypedBuilder)]
pub struct GatewayWatcher {
    gateway_classes: Arc<dyn ResourceStore<GatewayClass>>,
    store: Arc<dyn ResourceStore<Gateway>>,
    class_events: mpsc::Receiver<ClassEvent>,
}

impl GatewayWatcher {
    pub async fn run<S>(mut self, mut events: S, shutdown: CancellationToken) -> crate::Result<()>
    where
        S: Stream<Item = WatchEvent<Gateway>> + Send + Unpin,
    {
        info!("Gateway watcher...started");
        let mut states = ObjectStates::default();
        let mut observed: HashMap<ResourceKey, Arc<Gateway>> = HashMap::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(WatchEvent::Created(gateway) | WatchEvent::Updated(gateway)) => {
                        let key = ResourceKey::from(gateway.as_ref());
                        observed.insert(key.clone(), Arc::clone(&gateway));
                        let input = self.observe(&gateway);
                        self.process(&mut states, &key, input, &gateway);
                    }
                    Some(WatchEvent::Deleted(gateway)) => {
                        let key = ResourceKey::from(gateway.as_ref());
                        observed.remove(&key);
                        self.process(&mut states, &key, Input::Deleted, &gateway);
                    }
                    None => break,
                },
                Some(class_event) = self.class_events.recv() => {
                    let class_name = class_event.class_name();
                    debug!("GatewayWatcher: re-evaluating gateways of class {class_name} after {class_event:?}");
                    for (key, gateway) in observed.iter().filter(|(_, gateway)| gateway.spec.gateway_class_name == class_name) {
                        let input = self.observe(gateway);
                        self.process(&mut states, key, input, gateway);
                    }
                }
            }
        }
        info!("Gateway watcher...stopped");
        Ok(())
    }

    fn observe(&self, gateway: &Gateway) -> Input {
        let class_key = ResourceKey::gateway_class(&gateway.spec.gateway_class_name);
        Input::Observed {
            owned: self.gateway_classes.get(&class_key).is_some(),
            status_current: true,
        }
    }

    fn process(&self, states: &mut ObjectStates, key: &ResourceKey, input: Input, gateway: &Arc<Gateway>) {
        let _entered = info_span!("GatewayWatcher", id = %key, version = ?gateway.metadata.resource_version).entered();
        let previous = states.get(key);
        let (state, effects) = states.apply(key, input);
        if previous != state {
            info!("{previous:?} -> {state:?}");
        }
        for effect in effects {
            match effect {
                Effect::Publish => self.store.put(key.clone(), Arc::clone(gateway)),
                Effect::Unpublish => {
                    self.store.delete(key);
                }
                Effect::WriteStatus | Effect::Requeue => debug!("GatewayWatcher: ignoring {effect:?}"),
            }
        }
    }
}
