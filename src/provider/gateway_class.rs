use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use gateway_api::apis::standard::gatewayclasses::GatewayClass;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use typed_builder::TypedBuilder;

use super::{
    patchers::{Operation, PatchContext},
    resource_table::ResourceStore,
    state_machine::{Effect, Input, ObjectState, ObjectStates},
    watch::WatchEvent,
    ClassEvent, ProviderError, REQUEUE_DELAY,
};
use crate::common::{ResourceKey, ACCEPTED_CONDITION_TYPE, CONDITION_STATUS_TRUE};

enum Queued {
    Watch(WatchEvent<GatewayClass>),
    Retry(Arc<GatewayClass>),
}

/// Accepts the gateway classes naming our controller, publishes them and tells
/// the gateway watcher about it.
#[derive(TypedBuilder)]
pub struct GatewayClassWatcher {
    controller_name: String,
    store: Arc<dyn ResourceStore<GatewayClass>>,
    patcher: mpsc::Sender<Operation<GatewayClass>>,
    class_events: mpsc::Sender<ClassEvent>,
    #[builder(default = REQUEUE_DELAY)]
    requeue_delay: Duration,
}

pub fn is_accepted(gateway_class: &GatewayClass) -> bool {
    let generation = gateway_class.metadata.generation;
    gateway_class.status.as_ref().and_then(|status| status.conditions.as_ref()).is_some_and(|conditions| {
        conditions.iter().any(|condition| {
            condition.type_ == ACCEPTED_CONDITION_TYPE
                && condition.status == CONDITION_STATUS_TRUE
                && (generation.is_none() || condition.observed_generation == generation)
        })
    })
}

impl GatewayClassWatcher {
    pub async fn run<S>(self, mut events: S, shutdown: CancellationToken) -> crate::Result<()>
    where
        S: Stream<Item = WatchEvent<GatewayClass>> + Send + Unpin,
    {
        info!("GatewayClass watcher...started");
        let mut states = ObjectStates::default();
        let (requeue_sender, mut requeue_receiver) = mpsc::channel(1024);
        loop {
            let queued = tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => Queued::Watch(event),
                    None => break,
                },
                Some(gateway_class) = requeue_receiver.recv() => Queued::Retry(gateway_class),
            };

            let (key, input, object) = match queued {
                Queued::Watch(WatchEvent::Created(object) | WatchEvent::Updated(object)) => (ResourceKey::from(object.as_ref()), self.observe(&object), object),
                Queued::Watch(WatchEvent::Deleted(object)) => (ResourceKey::from(object.as_ref()), Input::Deleted, object),
                Queued::Retry(object) => {
                    let key = ResourceKey::from(object.as_ref());
                    if !matches!(states.get(&key), ObjectState::Pending | ObjectState::Accepted) {
                        debug!("GatewayClassWatcher: {key} dropping retry, no longer ours");
                        continue;
                    }
                    // An accepted class may have been written since, the published copy is the newest.
                    let object = self.store.get(&key).unwrap_or(object);
                    (key, self.observe(&object), object)
                }
            };

            let span = info_span!("GatewayClassWatcher", id = %key, version = ?object.metadata.resource_version);
            self.process(&mut states, key, input, object, &requeue_sender, &shutdown).instrument(span).await;
        }
        info!("GatewayClass watcher...stopped");
        Ok(())
    }

    fn observe(&self, gateway_class: &GatewayClass) -> Input {
        Input::Observed {
            owned: gateway_class.spec.controller_name == self.controller_name,
            status_current: is_accepted(gateway_class),
        }
    }

    async fn process(
        &self,
        states: &mut ObjectStates,
        key: ResourceKey,
        input: Input,
        object: Arc<GatewayClass>,
        requeue_sender: &mpsc::Sender<Arc<GatewayClass>>,
        shutdown: &CancellationToken,
    ) {
        let mut object = object;
        let mut inputs = VecDeque::from([input]);
        while let Some(input) = inputs.pop_front() {
            let previous = states.get(&key);
            let (state, effects) = states.apply(&key, input);
            if previous != state {
                info!("{previous:?} -> {state:?}");
            }
            for effect in effects {
                match effect {
                    Effect::WriteStatus => match self.write_status(&key, shutdown).await {
                        Ok(patched) => {
                            object = Arc::new(patched);
                            inputs.push_back(Input::StatusWritten);
                        }
                        Err(ProviderError::Cancelled) => {
                            debug!("status write cancelled");
                            return;
                        }
                        Err(e) => {
                            warn!("Unable to write accepted status {e}");
                            inputs.push_back(Input::StatusFailed);
                        }
                    },
                    Effect::Publish => {
                        self.store.put(key.clone(), Arc::clone(&object));
                        let _ = self.class_events.send(ClassEvent::Accepted(key.name.clone())).await;
                    }
                    Effect::Unpublish => {
                        self.store.delete(&key);
                        let _ = self.class_events.send(ClassEvent::Removed(key.name.clone())).await;
                    }
                    Effect::Requeue => {
                        let requeue_sender = requeue_sender.clone();
                        let object = Arc::clone(&object);
                        let delay = self.requeue_delay;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = requeue_sender.send(object).await;
                        });
                    }
                }
            }
        }
    }

    async fn write_status(&self, key: &ResourceKey, shutdown: &CancellationToken) -> Result<GatewayClass, ProviderError> {
        let (response_sender, response_receiver) = oneshot::channel();
        self.patcher
            .send(Operation::PatchStatus(PatchContext {
                resource_key: key.clone(),
                controller_name: self.controller_name.clone(),
                response_sender,
                span: Span::current(),
            }))
            .await
            .map_err(|_| ProviderError::PatcherClosed)?;
        tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(ProviderError::Cancelled),
            res = response_receiver => res.map_err(|_| ProviderError::PatcherClosed)?,
        }
    }
}
