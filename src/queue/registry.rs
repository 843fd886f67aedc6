//! # Queue registry.
//!
//! Frames name their response queue by [`QueueId`]; the registry resolves ids to
//! live [`Queue`] handles. It keeps weak references only, so a queue disappears
//! from the registry when its last handle is dropped and no reference cycle
//! exists between queues and the frames they carry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::queue::QueueId;
use crate::queue::queue::{Queue, QueueInner};

/// Resolves queue ids to queue handles.
#[derive(Default)]
pub struct QueueRegistry {
    queues: RwLock<HashMap<QueueId, Weak<QueueInner>>>,
}

impl QueueRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, id: QueueId, queue: Weak<QueueInner>) {
        self.queues.write().insert(id, queue);
    }

    pub(crate) fn unregister(&self, id: &QueueId) {
        self.queues.write().remove(id);
    }

    /// Returns the live queue for `id`.
    pub fn resolve(&self, id: &QueueId) -> Option<Queue> {
        self.queues
            .read()
            .get(id)
            .and_then(Weak::upgrade)
            .map(Queue::from_inner)
    }

    /// Number of live queues.
    pub fn len(&self) -> usize {
        self.queues
            .read()
            .values()
            .filter(|q| q.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.len())
            .finish()
    }
}
