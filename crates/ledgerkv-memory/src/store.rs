use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use uuid::Uuid;

use ledgerkv_core::{BackendError, Frame, Instance};

/// Identifies one backend instance as a lock holder.
pub(crate) type HolderId = Uuid;

#[derive(Debug, Clone)]
pub(crate) struct StoredBook {
    pub guid: Uuid,
    pub version: i32,
    pub slots: Frame,
}

#[derive(Debug, Clone)]
pub(crate) struct ChangeEvent {
    pub seq: u64,
    pub holder: HolderId,
    pub guid: Uuid,
}

/// Everything stored at one `mem://` address.
#[derive(Debug, Default)]
pub(crate) struct MemoryDatabase {
    pub book: Option<StoredBook>,
    pub instances: BTreeMap<Uuid, Instance>,
    pub tombstones: HashSet<Uuid>,
    pub counters: HashMap<String, i64>,
    pub session_lock: Option<HolderId>,
    pub edit_locks: HashMap<Uuid, HolderId>,
    pub events: Vec<ChangeEvent>,
    /// Last event seen by each attached backend.
    cursors: HashMap<HolderId, u64>,
    next_seq: u64,
}

impl MemoryDatabase {
    pub fn record_change(&mut self, holder: HolderId, guid: Uuid) {
        self.next_seq += 1;
        self.events.push(ChangeEvent {
            seq: self.next_seq,
            holder,
            guid,
        });
        self.trim_events();
    }

    pub fn latest_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn changes_since(&self, seq: u64, holder: HolderId) -> impl Iterator<Item = &ChangeEvent> {
        self.events
            .iter()
            .filter(move |e| e.seq > seq && e.holder != holder)
    }

    /// Marks every event up to `seq` as seen by `holder`.
    pub fn advance_cursor(&mut self, holder: HolderId, seq: u64) {
        self.cursors.insert(holder, seq);
        self.trim_events();
    }

    /// Releases everything `holder` owns here and stops keeping events for it.
    pub fn detach(&mut self, holder: HolderId) {
        if self.session_lock == Some(holder) {
            self.session_lock = None;
        }
        self.edit_locks.retain(|_, h| *h != holder);
        self.cursors.remove(&holder);
        self.trim_events();
    }

    // An event is kept only while some other attached backend has not seen it.
    fn trim_events(&mut self) {
        let cursors = &self.cursors;
        self.events
            .retain(|e| cursors.iter().any(|(holder, seen)| *holder != e.holder && *seen < e.seq));
    }

    pub fn has_data(&self) -> bool {
        self.book.is_some() || !self.instances.is_empty()
    }
}

/// Shared storage behind every backend created by one `MemoryProvider`.
/// Cloning shares the same databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    databases: Arc<RwLock<BTreeMap<String, MemoryDatabase>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemoryDatabase>>, BackendError> {
        self.databases
            .read()
            .map_err(|_| BackendError::StorageFailure("memory store lock poisoned".to_string()))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemoryDatabase>>, BackendError> {
        self.databases
            .write()
            .map_err(|_| BackendError::StorageFailure("memory store lock poisoned".to_string()))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.read().map(|dbs| dbs.contains_key(address)).unwrap_or(false)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.read()
            .map(|dbs| dbs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// True if some session holds the single-writer lock on `address`.
    pub fn is_locked(&self, address: &str) -> bool {
        self.read()
            .map(|dbs| dbs.get(address).is_some_and(|db| db.session_lock.is_some()))
            .unwrap_or(false)
    }

    /// Change events still kept for unseen readers at `address`.
    pub fn retained_events(&self, address: &str) -> usize {
        self.read()
            .map(|dbs| dbs.get(address).map_or(0, |db| db.events.len()))
            .unwrap_or(0)
    }

    pub fn instance_count(&self, address: &str) -> usize {
        self.read()
            .map(|dbs| dbs.get(address).map_or(0, |db| db.instances.len()))
            .unwrap_or(0)
    }
}
