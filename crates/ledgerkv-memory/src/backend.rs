use std::collections::{btree_map::Entry, BTreeSet, HashMap};

use tracing::{debug, warn};
use uuid::Uuid;

use ledgerkv_core::{
    Backend, BackendError, Book, Frame, Instance, Location, PercentageFn, Query, QueryHandle, Value,
};

use crate::store::{HolderId, MemoryDatabase, MemoryStore, StoredBook};

/// Load every stored instance (1) or only the reference types (0).
pub const CONFIG_LOAD_EAGER: &str = "load/eager";
/// List of type names loaded up front when `load/eager` is 0.
pub const CONFIG_REFERENCE_TYPES: &str = "load/reference-types";

fn default_config() -> Frame {
    let mut config = Frame::new();
    config.set(
        "load",
        Value::Frame(
            [
                ("eager", Value::Integer(1)),
                ("reference-types", Value::List(Vec::new())),
            ]
            .into_iter()
            .collect(),
        ),
    );
    config
}

enum SyncAction {
    PushBook,
    PullBook,
    Push(Uuid),
    Pull(Uuid),
    Forget(Uuid),
    Destroy(Uuid),
}

pub struct MemoryBackend {
    store: MemoryStore,
    holder: HolderId,
    address: Option<String>,
    full_path: Option<String>,
    config: Frame,
    percentage: Option<PercentageFn>,
    queries: HashMap<u64, Query>,
    next_query: u64,
    last_seen: u64,
    snapshots: HashMap<Uuid, Instance>,
}

impl MemoryBackend {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            holder: Uuid::new_v4(),
            address: None,
            full_path: None,
            config: default_config(),
            percentage: None,
            queries: HashMap::new(),
            next_query: 0,
            last_seen: 0,
            snapshots: HashMap::new(),
        }
    }

    fn address(&self) -> Result<&str, BackendError> {
        self.address
            .as_deref()
            .ok_or_else(|| BackendError::Misuse("no session has begun".to_string()))
    }

    fn with_db<R>(
        &self,
        f: impl FnOnce(&mut MemoryDatabase) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let address = self.address()?;
        let mut dbs = self.store.write()?;
        let db = dbs
            .get_mut(address)
            .ok_or_else(|| BackendError::NoSuchLocation(address.to_string()))?;
        f(db)
    }

    fn with_db_read<R>(
        &self,
        f: impl FnOnce(&MemoryDatabase) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let address = self.address()?;
        let dbs = self.store.read()?;
        let db = dbs
            .get(address)
            .ok_or_else(|| BackendError::NoSuchLocation(address.to_string()))?;
        f(db)
    }

    fn report(&mut self, message: &str, percent: f64) {
        if let Some(callback) = self.percentage.as_mut() {
            callback(Some(message), percent);
        }
    }

    fn compiled(&self, handle: &QueryHandle) -> Result<&Query, BackendError> {
        if handle.issuer() != self.holder {
            return Err(BackendError::Misuse(format!(
                "query handle {} was compiled by another backend",
                handle.id()
            )));
        }
        self.queries
            .get(&handle.id())
            .ok_or_else(|| BackendError::Misuse(format!("unknown query handle {}", handle.id())))
    }

    fn load_policy(&self) -> (bool, Vec<String>) {
        let eager = self
            .config
            .get_slot_at(CONFIG_LOAD_EAGER)
            .and_then(Value::as_int)
            .map_or(true, |v| v != 0);
        let reference_types = self
            .config
            .get_slot_at(CONFIG_REFERENCE_TYPES)
            .and_then(Value::as_list)
            .map(|types| types.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        (eager, reference_types)
    }
}

fn ensure_writer(db: &MemoryDatabase, holder: HolderId) -> Result<(), BackendError> {
    if db.session_lock != Some(holder) {
        return Err(BackendError::Locked(
            "session lock was taken over by another session".to_string(),
        ));
    }
    Ok(())
}

fn ensure_edit_lock(db: &MemoryDatabase, holder: HolderId, guid: Uuid) -> Result<(), BackendError> {
    match db.edit_locks.get(&guid) {
        Some(owner) if *owner != holder => Err(BackendError::Locked(format!("instance {}", guid))),
        _ => Ok(()),
    }
}

fn plan_sync(db: &MemoryDatabase, book: &Book, holder: HolderId) -> Vec<SyncAction> {
    let mut plan = Vec::new();
    match &db.book {
        None => plan.push(SyncAction::PushBook),
        Some(stored) if book.version > stored.version => plan.push(SyncAction::PushBook),
        Some(stored) if stored.version > book.version => plan.push(SyncAction::PullBook),
        Some(_) => {}
    }

    for instance in book.iter() {
        let guid = instance.guid;
        if db.edit_locks.get(&guid).is_some_and(|owner| *owner != holder) {
            continue;
        }
        if db.tombstones.contains(&guid) {
            plan.push(SyncAction::Forget(guid));
        } else if instance.destroyed {
            plan.push(SyncAction::Destroy(guid));
        } else {
            match db.instances.get(&guid) {
                None => plan.push(SyncAction::Push(guid)),
                Some(stored) if instance.version > stored.version => plan.push(SyncAction::Push(guid)),
                Some(stored) if stored.version > instance.version => plan.push(SyncAction::Pull(guid)),
                Some(_) => {}
            }
        }
    }
    plan
}

fn apply_sync(db: &mut MemoryDatabase, book: &mut Book, holder: HolderId, plan: Vec<SyncAction>) {
    for action in plan {
        match action {
            SyncAction::PushBook => {
                book.version = book.version.max(1);
                db.book = Some(StoredBook {
                    guid: book.guid,
                    version: book.version,
                    slots: book.slots.clone(),
                });
                db.record_change(holder, book.guid);
            }
            SyncAction::PullBook => {
                if let Some(stored) = &db.book {
                    book.guid = stored.guid;
                    book.version = stored.version;
                    book.slots = stored.slots.clone();
                }
            }
            SyncAction::Push(guid) => {
                if let Some(instance) = book.get_mut(&guid) {
                    instance.version = instance.version.max(1);
                    db.instances.insert(guid, instance.clone());
                    db.record_change(holder, guid);
                }
            }
            SyncAction::Pull(guid) => {
                if let Some(stored) = db.instances.get(&guid) {
                    book.insert(stored.clone());
                }
            }
            SyncAction::Forget(guid) => {
                book.remove(&guid);
            }
            SyncAction::Destroy(guid) => {
                book.remove(&guid);
                db.instances.remove(&guid);
                db.tombstones.insert(guid);
                db.record_change(holder, guid);
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn session_begin(
        &mut self,
        location: &Location,
        ignore_lock: bool,
        create_if_nonexistent: bool,
    ) -> Result<(), BackendError> {
        let address = location.address();
        if address.is_empty() {
            return Err(BackendError::BadLocation(format!("{} has no address", location)));
        }

        let holder = self.holder;
        let mut dbs = self.store.write()?;
        let db = match dbs.entry(address.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) if create_if_nonexistent => {
                debug!(%location, "Creating memory database");
                entry.insert(MemoryDatabase::default())
            }
            Entry::Vacant(_) => return Err(BackendError::NoSuchLocation(location.to_string())),
        };

        match db.session_lock {
            Some(owner) if owner != holder && !ignore_lock => {
                return Err(BackendError::Locked(location.to_string()));
            }
            Some(owner) if owner != holder => {
                warn!(%location, "Breaking lock held by another session");
            }
            _ => {}
        }
        db.session_lock = Some(holder);
        let seq = db.latest_seq();
        db.advance_cursor(holder, seq);
        drop(dbs);

        self.last_seen = seq;
        self.address = Some(address.to_string());
        self.full_path = Some(location.to_string());
        Ok(())
    }

    fn session_end(&mut self) -> Result<(), BackendError> {
        let Some(address) = self.address.take() else {
            return Ok(());
        };
        self.queries.clear();
        self.snapshots.clear();
        let mut dbs = self.store.write()?;
        if let Some(db) = dbs.get_mut(&address) {
            db.detach(self.holder);
        }
        debug!(address = %address, "Memory session ended");
        Ok(())
    }

    fn load(&mut self, book: &mut Book) -> Result<(), BackendError> {
        let (eager, reference_types) = self.load_policy();
        self.report("loading", 0.0);

        let holder = self.holder;
        let (loaded, seq) = self.with_db(|db| {
            if let Some(stored) = &db.book {
                book.guid = stored.guid;
                book.version = stored.version;
                book.slots = stored.slots.clone();
            }
            let mut loaded = 0;
            for instance in db.instances.values() {
                if eager || reference_types.contains(&instance.type_name) {
                    book.insert(instance.clone());
                    loaded += 1;
                }
            }
            let seq = db.latest_seq();
            db.advance_cursor(holder, seq);
            Ok((loaded, seq))
        })?;

        self.last_seen = seq;
        self.report("loaded", 100.0);
        debug!(loaded, eager, "Book loaded");
        Ok(())
    }

    fn begin(&mut self, instance: &Instance) -> Result<(), BackendError> {
        let holder = self.holder;
        self.with_db(|db| {
            ensure_edit_lock(db, holder, instance.guid)?;
            db.edit_locks.insert(instance.guid, holder);
            Ok(())
        })?;
        self.snapshots
            .entry(instance.guid)
            .or_insert_with(|| instance.clone());
        Ok(())
    }

    fn commit(&mut self, instance: &mut Instance) -> Result<(), BackendError> {
        let holder = self.holder;
        self.with_db(|db| {
            ensure_writer(db, holder)?;
            ensure_edit_lock(db, holder, instance.guid)?;
            if db.tombstones.contains(&instance.guid) {
                return Err(BackendError::ModifyDestroyed(instance.guid.to_string()));
            }

            if instance.destroyed {
                db.instances.remove(&instance.guid);
                db.tombstones.insert(instance.guid);
            } else {
                let stored = db.instances.get(&instance.guid).map_or(0, |i| i.version);
                instance.version = stored.max(instance.version) + 1;
                db.instances.insert(instance.guid, instance.clone());
            }
            db.edit_locks.remove(&instance.guid);
            db.record_change(holder, instance.guid);
            Ok(())
        })?;
        self.snapshots.remove(&instance.guid);
        debug!(guid = %instance.guid, version = instance.version, destroyed = instance.destroyed, "Instance committed");
        Ok(())
    }

    /// Restores the copy taken at `begin`, or the stored one if there is no
    /// snapshot.
    fn rollback(&mut self, instance: &mut Instance) -> Result<(), BackendError> {
        let holder = self.holder;
        let snapshot = self.snapshots.remove(&instance.guid);
        self.with_db(|db| {
            if db.edit_locks.get(&instance.guid) == Some(&holder) {
                db.edit_locks.remove(&instance.guid);
            }
            if db.tombstones.contains(&instance.guid) {
                return Err(BackendError::ModifyDestroyed(instance.guid.to_string()));
            }
            if let Some(original) = snapshot.or_else(|| db.instances.get(&instance.guid).cloned()) {
                *instance = original;
            }
            Ok(())
        })
    }

    fn compile_query(&mut self, query: &Query) -> Result<QueryHandle, BackendError> {
        if query.type_name().is_empty() {
            return Err(BackendError::Misuse("query does not name a type".to_string()));
        }
        self.next_query += 1;
        self.queries.insert(self.next_query, query.clone());
        Ok(QueryHandle::new(self.holder, self.next_query))
    }

    fn run_query(&mut self, book: &mut Book, handle: &QueryHandle) -> Result<usize, BackendError> {
        let query = self.compiled(handle)?;
        let limit = query.max_results().unwrap_or(usize::MAX);

        let merged = self.with_db_read(|db| {
            let mut merged = 0;
            for stored in db.instances.values().filter(|i| query.matches(i)).take(limit) {
                let fresher = book
                    .get(&stored.guid)
                    .map_or(true, |local| stored.version > local.version);
                if fresher {
                    book.insert(stored.clone());
                    merged += 1;
                }
            }
            Ok(merged)
        })?;
        debug!(handle = handle.id(), merged, "Query run");
        Ok(merged)
    }

    fn free_query(&mut self, handle: QueryHandle) -> Result<(), BackendError> {
        self.compiled(&handle)?;
        self.queries.remove(&handle.id());
        Ok(())
    }

    fn sync(&mut self, book: &mut Book) -> Result<(), BackendError> {
        let holder = self.holder;
        self.report("syncing", 0.0);
        let actions = self.with_db(|db| {
            ensure_writer(db, holder)?;
            let plan = plan_sync(db, book, holder);
            let actions = plan.len();
            apply_sync(db, book, holder, plan);
            Ok(actions)
        })?;
        self.report("synced", 100.0);
        debug!(actions, "Book synced");
        Ok(())
    }

    fn load_config(&mut self, config: Frame) -> Result<(), BackendError> {
        if let Some(value) = config.get_slot_at(CONFIG_LOAD_EAGER) {
            if value.as_int().is_none() {
                return Err(BackendError::Misuse(format!(
                    "{} must be an integer, got {}",
                    CONFIG_LOAD_EAGER,
                    value.value_type()
                )));
            }
        }
        if let Some(value) = config.get_slot_at(CONFIG_REFERENCE_TYPES) {
            if value.as_list().is_none() {
                return Err(BackendError::Misuse(format!(
                    "{} must be a list, got {}",
                    CONFIG_REFERENCE_TYPES,
                    value.value_type()
                )));
            }
        }
        self.config.merge(config);
        Ok(())
    }

    fn get_config(&self) -> Frame {
        self.config.clone()
    }

    fn counter(&mut self, name: &str) -> Result<i64, BackendError> {
        if name.is_empty() {
            return Err(BackendError::Misuse("counter name is empty".to_string()));
        }
        self.with_db(|db| {
            let value = db.counters.entry(name.to_string()).or_insert(0);
            *value += 1;
            Ok(*value)
        })
    }

    fn events_pending(&self) -> bool {
        self.with_db_read(|db| Ok(db.changes_since(self.last_seen, self.holder).next().is_some()))
            .unwrap_or(false)
    }

    fn process_events(&mut self, book: &mut Book) -> Result<bool, BackendError> {
        let holder = self.holder;
        let last_seen = self.last_seen;
        let (changed, seq) = self.with_db(|db| {
            let guids: BTreeSet<Uuid> = db.changes_since(last_seen, holder).map(|e| e.guid).collect();
            let mut changed = false;
            for guid in guids {
                if guid == book.guid {
                    if let Some(stored) = db.book.as_ref().filter(|s| s.version > book.version) {
                        book.version = stored.version;
                        book.slots = stored.slots.clone();
                        changed = true;
                    }
                } else if book.contains(&guid) {
                    if db.tombstones.contains(&guid) {
                        book.remove(&guid);
                        changed = true;
                    } else if let Some(stored) = db.instances.get(&guid) {
                        let stale = book.get(&guid).is_some_and(|local| stored.version > local.version);
                        if stale {
                            book.insert(stored.clone());
                            changed = true;
                        }
                    }
                }
            }
            let seq = db.latest_seq();
            db.advance_cursor(holder, seq);
            Ok((changed, seq))
        })?;
        self.last_seen = seq;
        Ok(changed)
    }

    fn save_may_clobber_data(&self) -> bool {
        self.with_db_read(|db| Ok(db.has_data())).unwrap_or(false)
    }

    fn set_percentage(&mut self, callback: Option<PercentageFn>) {
        self.percentage = callback;
    }

    fn full_path(&self) -> Option<&str> {
        self.full_path.as_deref()
    }
}

impl Drop for MemoryBackend {
    fn drop(&mut self) {
        if self.address.is_some() {
            if let Err(e) = self.session_end() {
                warn!(error = %e, "Failed to release memory session on drop");
            }
        }
    }
}
