use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt,
};
use kube::{
    runtime::{reflector::ObjectRef, watcher, WatchStreamExt},
    Api, Resource,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Create, update and delete notifications for one kind of object.
#[derive(Debug)]
pub enum WatchEvent<R> {
    Created(Arc<R>),
    Updated(Arc<R>),
    Deleted(Arc<R>),
}

impl<R> Clone for WatchEvent<R> {
    fn clone(&self) -> Self {
        match self {
            WatchEvent::Created(object) => WatchEvent::Created(Arc::clone(object)),
            WatchEvent::Updated(object) => WatchEvent::Updated(Arc::clone(object)),
            WatchEvent::Deleted(object) => WatchEvent::Deleted(Arc::clone(object)),
        }
    }
}

/// Watches every object of kind `R` for the lifetime of the returned stream.
/// Dropping the stream closes the underlying watch connection.
pub fn kube_events<R>(api: Api<R>) -> BoxStream<'static, WatchEvent<R>>
where
    R: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default + Eq + Hash + Clone + Send,
{
    watch_events(watcher(api, watcher::Config::default()).default_backoff()).boxed()
}

/// Maps raw watcher events onto [`WatchEvent`]s. A relist after a desync does
/// not report objects removed while disconnected, so every known object missing
/// from the relist is reported as deleted once the relist is complete.
pub fn watch_events<R, S>(events: S) -> impl Stream<Item = WatchEvent<R>> + Send
where
    R: Resource + Send + Sync + 'static,
    R::DynamicType: Default + Eq + Hash + Clone + Send,
    S: Stream<Item = Result<watcher::Event<R>, watcher::Error>> + Send,
{
    let mut known: HashMap<ObjectRef<R>, Arc<R>> = HashMap::new();
    let mut relisted: Option<HashSet<ObjectRef<R>>> = None;
    events
        .map(move |event| match event {
            Ok(watcher::Event::Init) => {
                debug!("watch resync {}", std::any::type_name::<R>());
                relisted = Some(HashSet::new());
                vec![]
            }
            Ok(watcher::Event::InitApply(object)) => {
                let key = ObjectRef::from_obj(&object);
                if let Some(relisted) = relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                vec![applied(&mut known, key, object)]
            }
            Ok(watcher::Event::InitDone) => {
                let Some(relisted) = relisted.take() else {
                    return vec![];
                };
                let gone: Vec<_> = known.keys().filter(|key| !relisted.contains(*key)).cloned().collect();
                gone.into_iter()
                    .filter_map(|key| known.remove(&key))
                    .inspect(|_| debug!("{} removed while the watch was down", std::any::type_name::<R>()))
                    .map(WatchEvent::Deleted)
                    .collect()
            }
            Ok(watcher::Event::Apply(object)) => {
                let key = ObjectRef::from_obj(&object);
                vec![applied(&mut known, key, object)]
            }
            Ok(watcher::Event::Delete(object)) => {
                known.remove(&ObjectRef::from_obj(&object));
                vec![WatchEvent::Deleted(Arc::new(object))]
            }
            Err(e) => {
                warn!("watch error {}: {e}", std::any::type_name::<R>());
                vec![]
            }
        })
        .flat_map(stream::iter)
}

fn applied<R>(known: &mut HashMap<ObjectRef<R>, Arc<R>>, key: ObjectRef<R>, object: R) -> WatchEvent<R>
where
    R: Resource,
    R::DynamicType: Eq + Hash + Clone,
{
    let object = Arc::new(object);
    match known.insert(key, Arc::clone(&object)) {
        Some(_) => WatchEvent::Updated(object),
        None => WatchEvent::Created(object),
    }
}
