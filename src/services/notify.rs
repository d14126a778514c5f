//! Publish/subscribe fan-out of player snapshots.
//!
//! Delivery is synchronous from the publishing thread: subscribers must not
//! block in the callback, and anything slow (disk, sockets) belongs on the
//! subscriber's own thread fed from here. The registry lock is released
//! before any callback runs, so subscribers are free to add or remove
//! subscriptions during dispatch.

use std::sync::{Arc, Mutex};

use crate::models::PlayerSnapshot;

pub type SubscriberFn = Arc<dyn Fn(&PlayerSnapshot) + Send + Sync>;
pub type OneShotFn = Box<dyn FnOnce(&PlayerSnapshot) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct Registry {
    next_id: u64,
    persistent: Vec<(SubscriberId, SubscriberFn)>,
    /// One-shot subscribers, removed after a single delivery. Used by
    /// long-polling "notify" commands.
    one_shot: Vec<OneShotFn>,
}

pub struct NotifyBus {
    registry: Mutex<Registry>,
}

impl NotifyBus {
    pub fn new() -> Self {
        NotifyBus {
            registry: Mutex::new(Registry {
                next_id: 0,
                persistent: Vec::new(),
                one_shot: Vec::new(),
            }),
        }
    }

    pub fn add(&self, callback: SubscriberFn) -> SubscriberId {
        let mut reg = self.registry.lock().unwrap();
        let id = SubscriberId(reg.next_id);
        reg.next_id += 1;
        reg.persistent.push((id, callback));
        id
    }

    pub fn remove(&self, id: SubscriberId) {
        let mut reg = self.registry.lock().unwrap();
        reg.persistent.retain(|(sid, _)| *sid != id);
    }

    pub fn add_one_shot(&self, callback: OneShotFn) {
        self.registry.lock().unwrap().one_shot.push(callback);
    }

    pub fn publish(&self, snapshot: &PlayerSnapshot) {
        let (persistent, one_shot) = {
            let mut reg = self.registry.lock().unwrap();
            let persistent: Vec<SubscriberFn> =
                reg.persistent.iter().map(|(_, f)| f.clone()).collect();
            let one_shot: Vec<OneShotFn> = reg.one_shot.drain(..).collect();
            (persistent, one_shot)
        };

        for callback in persistent {
            callback(snapshot);
        }
        for callback in one_shot {
            callback(snapshot);
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        let reg = self.registry.lock().unwrap();
        reg.persistent.len() + reg.one_shot.len()
    }
}
