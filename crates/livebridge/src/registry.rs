//! # Remote Object Registry
//!
//! Maps object ids to the local objects a peer exposes for remote invocation.
//!
//! ## Invariants
//! - **Fresh Ids**: Ids are strictly increasing from 1 and never reused, even after dispose.
//! - **Uniform Misses**: A call against an id that was never exported and one against a
//!   disposed id fail identically (`FailureKind::UnknownObject`).
//! - **Contained Panics**: A handler that panics yields a `Domain` failure; the registry
//!   and the peer pump keep running.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use futures::FutureExt;
use livepack::Value;
use liverpc::ErrorInfo;
use liverpc::ObjectId;

use crate::peer::Peer;

/// A local object that can be invoked from the other side.
#[async_trait::async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    /// Serves one call.
    ///
    /// `peer` is the connection the call arrived on, so handlers may issue
    /// re-entrant calls back to the caller before answering.
    async fn handle_call(
        &self,
        peer: &Peer,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ErrorInfo>;
}

/// Id-to-object table. Cloning yields another handle to the same table.
#[derive(Clone)]
pub struct ObjectRegistry {
    objects: Arc<DashMap<ObjectId, Arc<dyn RemoteObject>>>,
    id_gen: Arc<AtomicU64>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            id_gen: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> ObjectId {
        ObjectId(self.id_gen.fetch_add(1, Ordering::Relaxed))
    }

    /// Exposes `object` under a fresh id.
    pub fn export(&self, object: Arc<dyn RemoteObject>) -> ObjectId {
        let id = self.next_id();
        self.objects.insert(id, object);
        tracing::debug!(%id, "exported object");
        id
    }

    /// Exposes an object that needs to know its own id at construction.
    pub fn export_with<T, F>(&self, build: F) -> (ObjectId, Arc<T>)
    where
        T: RemoteObject,
        F: FnOnce(ObjectId) -> T,
    {
        let id = self.next_id();
        let object = Arc::new(build(id));
        self.objects.insert(id, object.clone());
        tracing::debug!(%id, "exported object");
        (id, object)
    }

    /// Withdraws an object. Returns false if `id` was not exported.
    pub fn dispose(&self, id: ObjectId) -> bool {
        let removed = self.objects.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "disposed object");
        }
        removed
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<dyn RemoteObject>> {
        self.objects.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Routes one inbound call to its target.
    pub async fn dispatch(
        &self,
        peer: &Peer,
        id: ObjectId,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ErrorInfo> {
        // Clone the Arc out so no shard lock is held across the handler's await points.
        let Some(object) = self.get(id) else {
            return Err(ErrorInfo::unknown_object(id));
        };

        let call = std::panic::AssertUnwindSafe(object.handle_call(peer, method, args));
        match call.catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(%id, method, %message, "handler panicked");
                Err(ErrorInfo::domain(format!("Handler panicked: {}", message)))
            }
        }
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
