//! Signal processors: turn record lifecycle events into index updates.
//!
//! [`BaseSignalProcessor`] never listens; applications call `handle_save` and
//! `handle_delete` themselves. [`RealtimeSignalProcessor`] attaches exactly one
//! handler to each hook and keeps the write connections current as records
//! change.

use crate::connections::Connections;
use crate::error::{Result, SheafError};
use crate::record::Record;
use crate::store::{EventKind, LifecycleHooks, RecordEvent, SubscriptionId};
use std::sync::{Arc, Weak};

/// Reacts to record lifecycle events
pub trait SignalProcessor {
    fn connections(&self) -> &Arc<Connections>;

    /// Start listening; calling it again while attached changes nothing
    fn setup(&mut self, _hooks: &Arc<LifecycleHooks>) -> Result<()> {
        Ok(())
    }

    /// Stop listening; safe to call when not attached
    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Upsert the record on every write connection that handles its type
    fn handle_save(&self, record: &Record) -> Result<()> {
        propagate(self.connections(), record, Change::Save)
    }

    /// Remove the record from every write connection that handles its type
    fn handle_delete(&self, record: &Record) -> Result<()> {
        propagate(self.connections(), record, Change::Delete)
    }
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Save,
    Delete,
}

fn propagate(connections: &Connections, record: &Record, change: Change) -> Result<()> {
    let mut first_error = None;

    for name in connections.router().for_write() {
        let result = connections.get_unified_index(name).and_then(|unified| {
            let index = match unified.get_index(&record.record_type) {
                Ok(index) => index,
                Err(SheafError::NotHandled { .. }) => {
                    tracing::debug!(
                        connection = name.as_str(),
                        record_type = %record.record_type,
                        "record type not handled, skipping"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            match change {
                Change::Save => index.update_object(connections, record, Some(name)),
                Change::Delete => index.remove_object(connections, record, Some(name)),
            }
        });

        if let Err(e) = result {
            tracing::warn!(
                connection = name.as_str(),
                record_type = %record.record_type,
                record_id = record.id,
                change = ?change,
                error = %e,
                "failed to propagate record change"
            );
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Processor that only propagates when asked to
#[derive(Debug, Clone)]
pub struct BaseSignalProcessor {
    connections: Arc<Connections>,
}

impl BaseSignalProcessor {
    pub fn new(connections: Arc<Connections>) -> Self {
        Self { connections }
    }
}

impl SignalProcessor for BaseSignalProcessor {
    fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }
}

/// Hook handlers owned by a processor; detached on release or drop
#[derive(Debug)]
pub struct SignalSubscription {
    hooks: Weak<LifecycleHooks>,
    ids: Vec<SubscriptionId>,
}

impl SignalSubscription {
    fn is_for(&self, hooks: &Arc<LifecycleHooks>) -> bool {
        std::ptr::eq(self.hooks.as_ptr(), Arc::as_ptr(hooks))
    }

    /// Detach every handler now
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(hooks) = self.hooks.upgrade() {
            for id in self.ids.drain(..) {
                hooks.disconnect(id);
            }
        }
        self.ids.clear();
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Processor that keeps indexes current on every save and delete
#[derive(Debug)]
pub struct RealtimeSignalProcessor {
    connections: Arc<Connections>,
    subscription: Option<SignalSubscription>,
}

impl RealtimeSignalProcessor {
    pub fn new(connections: Arc<Connections>) -> Self {
        Self {
            connections,
            subscription: None,
        }
    }

    /// Build and attach in one step
    pub fn attach(connections: Arc<Connections>, hooks: &Arc<LifecycleHooks>) -> Result<Self> {
        let mut processor = Self::new(connections);
        processor.setup(hooks)?;
        Ok(processor)
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }
}

impl SignalProcessor for RealtimeSignalProcessor {
    fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    fn setup(&mut self, hooks: &Arc<LifecycleHooks>) -> Result<()> {
        if let Some(subscription) = &self.subscription {
            if subscription.is_for(hooks) {
                return Ok(());
            }
        }
        // Moving to another hook registry: leave the old one first
        self.teardown()?;

        let saved = Arc::clone(&self.connections);
        let save_id = hooks.connect(EventKind::Saved, move |event: &RecordEvent| {
            propagate(&saved, event.record(), Change::Save)
        });
        let deleted = Arc::clone(&self.connections);
        let delete_id = hooks.connect(EventKind::Deleted, move |event: &RecordEvent| {
            propagate(&deleted, event.record(), Change::Delete)
        });

        self.subscription = Some(SignalSubscription {
            hooks: Arc::downgrade(hooks),
            ids: vec![save_id, delete_id],
        });
        tracing::debug!("realtime signal processor attached");
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
            tracing::debug!("realtime signal processor detached");
        }
        Ok(())
    }
}
