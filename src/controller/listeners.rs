//! Name-keyed registry of snapshot listeners.
//!
//! Every listener gets one long-lived forwarder task fed by a bounded queue.
//! Publishing only pushes onto those queues, so a listener that never reads
//! its channel parks its own forwarder and never the control loop. Snapshots
//! reach each listener in publish order; once a listener falls
//! [`QUEUE_DEPTH`] snapshots behind, newer ones are dropped for it.

use crate::interfaces::{StateSender, ThermaboxState};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Snapshots buffered per listener on top of the listener's own channel.
pub const QUEUE_DEPTH: usize = 16;

struct Listener {
    /// The listener's own channel, kept to notice when it is closed.
    sender: StateSender,
    queue: mpsc::Sender<ThermaboxState>,
}

impl Listener {
    fn spawn(name: &str, sender: StateSender) -> Self {
        let (queue, mut pending) = mpsc::channel::<ThermaboxState>(QUEUE_DEPTH);
        let forward_to = sender.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            while let Some(snapshot) = pending.recv().await {
                if forward_to.send(snapshot).await.is_err() {
                    debug!("[Thermabox] Listener '{}' went away", name);
                    break;
                }
            }
        });
        Self { sender, queue }
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<BTreeMap<String, Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` under `name`. Returns `true` if an existing channel was replaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, name: &str, listener: StateSender) -> bool {
        let entry = Listener::spawn(name, listener);
        let replaced = self
            .listeners
            .lock()
            .insert(name.to_string(), entry)
            .is_some();
        if replaced {
            info!("[Thermabox] Replaced listener channel '{}'", name);
        } else {
            info!("[Thermabox] Registered listener channel '{}'", name);
        }
        replaced
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.listeners.lock().remove(name).is_some();
        if removed {
            info!("[Thermabox] Unregistered listener channel '{}'", name);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.listeners.lock().keys().cloned().collect()
    }

    /// Queue a copy of `snapshot` for every open listener.
    ///
    /// Never waits. Returns the number of listeners the snapshot was queued for.
    pub fn publish(&self, snapshot: &ThermaboxState) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|name, listener| {
            if listener.sender.is_closed() || listener.queue.is_closed() {
                debug!("[Thermabox] Dropping closed listener channel '{}'", name);
                false
            } else {
                true
            }
        });

        let mut queued = 0;
        for (name, listener) in listeners.iter() {
            match listener.queue.try_send(snapshot.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("[Thermabox] Listener '{}' is behind, dropping snapshot", name);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("[Thermabox] Listener '{}' stopped forwarding", name);
                }
            }
        }
        queued
    }
}
