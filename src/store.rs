//! In-process record store and its lifecycle hooks.
//!
//! The store stands in for the host application's data layer: it assigns ids,
//! keeps records by type, and announces every save and delete on its
//! [`LifecycleHooks`]. Signal processors listen there to keep search indexes
//! in sync.

use crate::error::{Result, SheafError};
use crate::record::{Record, RecordId, RecordType};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Handle returned by [`LifecycleHooks::connect`]
pub type SubscriptionId = u64;

/// Hook a handler is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Saved,
    Deleted,
}

/// Change announced to hook handlers
#[derive(Debug, Clone)]
pub enum RecordEvent {
    Saved { record: Record, created: bool },
    Deleted { record: Record },
}

impl RecordEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RecordEvent::Saved { .. } => EventKind::Saved,
            RecordEvent::Deleted { .. } => EventKind::Deleted,
        }
    }

    pub fn record(&self) -> &Record {
        match self {
            RecordEvent::Saved { record, .. } | RecordEvent::Deleted { record } => record,
        }
    }
}

type Handler = Arc<dyn Fn(&RecordEvent) -> Result<()> + Send + Sync>;

struct Receiver {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Post-save / post-delete hook registry
pub struct LifecycleHooks {
    receivers: Mutex<Vec<Receiver>>,
    next_id: AtomicU64,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("saved", &self.receiver_count(EventKind::Saved))
            .field("deleted", &self.receiver_count(EventKind::Deleted))
            .finish()
    }
}

impl Default for LifecycleHooks {
    fn default() -> Self {
        Self {
            receivers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl LifecycleHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&RecordEvent) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.receivers().push(Receiver {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Detach a handler; false if it was not attached
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut receivers = self.receivers();
        let before = receivers.len();
        receivers.retain(|r| r.id != id);
        receivers.len() != before
    }

    pub fn receiver_count(&self, kind: EventKind) -> usize {
        self.receivers().iter().filter(|r| r.kind == kind).count()
    }

    /// Run every handler attached to the event's hook. All handlers run even
    /// if one fails; the first failure is returned.
    pub fn emit(&self, event: &RecordEvent) -> Result<()> {
        let kind = event.kind();
        // Snapshot so handlers may connect or disconnect while running
        let handlers: Vec<Handler> = self
            .receivers()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| Arc::clone(&r.handler))
            .collect();

        let mut first_error = None;
        for handler in handlers {
            if let Err(e) = handler(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn receivers(&self) -> std::sync::MutexGuard<'_, Vec<Receiver>> {
        self.receivers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Anything that can enumerate the current records of a type
pub trait RecordSource: Send + Sync {
    fn records_of(&self, record_type: &RecordType) -> Vec<Record>;
}

impl RecordSource for [Record] {
    fn records_of(&self, record_type: &RecordType) -> Vec<Record> {
        self.iter()
            .filter(|r| &r.record_type == record_type)
            .cloned()
            .collect()
    }
}

impl RecordSource for Vec<Record> {
    fn records_of(&self, record_type: &RecordType) -> Vec<Record> {
        self.as_slice().records_of(record_type)
    }
}

/// In-memory record store that announces its changes
pub struct RecordStore {
    records: RwLock<BTreeMap<RecordType, BTreeMap<RecordId, Record>>>,
    sequences: Mutex<HashMap<RecordType, RecordId>>,
    hooks: Arc<LifecycleHooks>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::with_hooks(LifecycleHooks::new())
    }
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("types", &self.record_types())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Arc<LifecycleHooks>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            sequences: Mutex::new(HashMap::new()),
            hooks,
        }
    }

    pub fn hooks(&self) -> &Arc<LifecycleHooks> {
        &self.hooks
    }

    /// Insert a new record with the next id of its type and announce it.
    /// The record is stored even if a hook handler fails.
    pub fn create(&self, record_type: impl Into<RecordType>, fields: Map<String, Value>) -> Result<Record> {
        let record_type = record_type.into();
        let id = self.next_id(&record_type);
        let record = Record::new(record_type, id, fields);
        self.put(record.clone());

        self.hooks.emit(&RecordEvent::Saved {
            record: record.clone(),
            created: true,
        })?;
        Ok(record)
    }

    /// Insert or replace a record and announce it
    pub fn save(&self, record: &Record) -> Result<()> {
        self.bump_sequence(&record.record_type, record.id);
        let created = self.put(record.clone()).is_none();
        self.hooks.emit(&RecordEvent::Saved {
            record: record.clone(),
            created,
        })
    }

    /// Delete a record and announce it; returns false when it did not exist
    pub fn delete(&self, record: &Record) -> Result<bool> {
        let removed = self
            .write()
            .get_mut(&record.record_type)
            .and_then(|by_id| by_id.remove(&record.id));

        match removed {
            Some(record) => {
                self.hooks.emit(&RecordEvent::Deleted { record })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert records without announcing them (fixtures, bulk imports)
    pub fn load<I>(&self, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.bump_sequence(&record.record_type, record.id);
            self.put(record);
        }
    }

    /// Load a JSON array of records from disk without announcing them
    pub fn load_file(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path).map_err(|e| {
            SheafError::InvalidRecord(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let records: Vec<Record> = serde_json::from_str(&content)?;
        let count = records.len();
        self.load(records);
        tracing::debug!(path = %path.display(), records = count, "loaded records");
        Ok(count)
    }

    pub fn get(&self, record_type: &RecordType, id: RecordId) -> Option<Record> {
        self.read().get(record_type)?.get(&id).cloned()
    }

    /// Records of a type, ordered by id
    pub fn all(&self, record_type: &RecordType) -> Vec<Record> {
        self.read()
            .get(record_type)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, record_type: &RecordType) -> usize {
        self.read().get(record_type).map_or(0, BTreeMap::len)
    }

    pub fn record_types(&self) -> Vec<RecordType> {
        self.read().keys().cloned().collect()
    }

    fn put(&self, record: Record) -> Option<Record> {
        self.write()
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.id, record)
    }

    fn next_id(&self, record_type: &RecordType) -> RecordId {
        let mut sequences = self.sequences.lock().unwrap_or_else(PoisonError::into_inner);
        let last = sequences.entry(record_type.clone()).or_insert(0);
        *last += 1;
        *last
    }

    fn bump_sequence(&self, record_type: &RecordType, id: RecordId) {
        let mut sequences = self.sequences.lock().unwrap_or_else(PoisonError::into_inner);
        let last = sequences.entry(record_type.clone()).or_insert(0);
        *last = (*last).max(id);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordType, BTreeMap<RecordId, Record>>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RecordType, BTreeMap<RecordId, Record>>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSource for RecordStore {
    fn records_of(&self, record_type: &RecordType) -> Vec<Record> {
        self.all(record_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_create_assigns_ids_per_type() {
        let store = RecordStore::new();
        let foo_1 = store.create("foo", fields([("body", "foo 1")])).unwrap();
        let foo_2 = store.create("foo", fields([("body", "foo 2")])).unwrap();
        let bar_1 = store.create("bar", fields([("content", "bar 1")])).unwrap();

        assert_eq!((foo_1.id, foo_2.id, bar_1.id), (1, 2, 1));
        assert_eq!(store.count(&"foo".into()), 2);
        assert_eq!(store.get(&"foo".into(), 2).unwrap().text("body").unwrap(), "foo 2");
    }

    #[test]
    fn test_load_does_not_emit_and_advances_ids() {
        let store = RecordStore::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        store.hooks().connect(EventKind::Saved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.load([Record::new("foo", 7, Map::new())]);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        let next = store.create("foo", Map::new()).unwrap();
        assert_eq!(next.id, 8);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_save_and_delete_emit() {
        let store = RecordStore::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let saved = Arc::clone(&events);
        store.hooks().connect(EventKind::Saved, move |event| {
            if let RecordEvent::Saved { created, .. } = event {
                saved.lock().unwrap().push(format!("saved:{}", created));
            }
            Ok(())
        });
        let deleted = Arc::clone(&events);
        store.hooks().connect(EventKind::Deleted, move |event| {
            deleted.lock().unwrap().push(format!("deleted:{}", event.record().id));
            Ok(())
        });

        let mut record = store.create("foo", fields([("body", "foo 1")])).unwrap();
        record.set("body", "changed");
        store.save(&record).unwrap();
        assert!(store.delete(&record).unwrap());
        assert!(!store.delete(&record).unwrap());

        assert_eq!(
            *events.lock().unwrap(),
            vec!["saved:true", "saved:false", "deleted:1"]
        );
    }

    #[test]
    fn test_disconnect() {
        let hooks = LifecycleHooks::new();
        let id = hooks.connect(EventKind::Saved, |_| Ok(()));
        assert_eq!(hooks.receiver_count(EventKind::Saved), 1);
        assert_eq!(hooks.receiver_count(EventKind::Deleted), 0);
        assert!(hooks.disconnect(id));
        assert!(!hooks.disconnect(id));
        assert_eq!(hooks.receiver_count(EventKind::Saved), 0);
    }

    #[test]
    fn test_emit_runs_all_handlers_and_returns_first_error() {
        let hooks = LifecycleHooks::new();
        let ran = Arc::new(AtomicUsize::new(0));

        hooks.connect(EventKind::Saved, |_| Err(SheafError::backend("a", "down")));
        let counter = Arc::clone(&ran);
        hooks.connect(EventKind::Saved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SheafError::backend("b", "down"))
        });

        let event = RecordEvent::Saved {
            record: Record::new("foo", 1, Map::new()),
            created: true,
        };
        let err = hooks.emit(&event).unwrap_err();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(matches!(err, SheafError::Backend { ref connection, .. } if connection == "a"));
    }

    #[test]
    fn test_create_keeps_record_when_hook_fails() {
        let store = RecordStore::new();
        store
            .hooks()
            .connect(EventKind::Saved, |_| Err(SheafError::backend("default", "down")));

        assert!(store.create("foo", Map::new()).is_err());
        assert_eq!(store.count(&"foo".into()), 1);
    }

    #[test]
    fn test_slice_source() {
        let records = vec![
            Record::new("foo", 1, Map::new()),
            Record::new("bar", 1, Map::new()),
        ];
        assert_eq!(records.records_of(&"foo".into()).len(), 1);
    }
}
