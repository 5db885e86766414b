use std::collections::BTreeMap;

use uuid::Uuid;

use crate::frame::Frame;

/// One persisted engine object.
///
/// `version` is 0 until the object has been committed once; backends bump it
/// on every commit and use it to reconcile during sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub guid: Uuid,
    pub type_name: String,
    pub version: i32,
    pub slots: Frame,
    pub destroyed: bool,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::with_guid(Uuid::new_v4(), type_name)
    }

    pub fn with_guid(guid: Uuid, type_name: impl Into<String>) -> Self {
        Self {
            guid,
            type_name: type_name.into(),
            version: 0,
            slots: Frame::new(),
            destroyed: false,
        }
    }

    /// Records a local change made outside a backend edit.
    pub fn mark_dirty(&mut self) {
        self.version += 1;
    }

    pub fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }
}

/// The engine's working set: book-level slots plus the instances currently
/// held in memory.
#[derive(Debug, Clone)]
pub struct Book {
    pub guid: Uuid,
    pub version: i32,
    pub slots: Frame,
    instances: BTreeMap<Uuid, Instance>,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    pub fn new() -> Self {
        Self {
            guid: Uuid::new_v4(),
            version: 0,
            slots: Frame::new(),
            instances: BTreeMap::new(),
        }
    }

    pub fn mark_dirty(&mut self) {
        self.version += 1;
    }

    pub fn insert(&mut self, instance: Instance) -> Option<Instance> {
        self.instances.insert(instance.guid, instance)
    }

    pub fn get(&self, guid: &Uuid) -> Option<&Instance> {
        self.instances.get(guid)
    }

    pub fn get_mut(&mut self, guid: &Uuid) -> Option<&mut Instance> {
        self.instances.get_mut(guid)
    }

    pub fn remove(&mut self, guid: &Uuid) -> Option<Instance> {
        self.instances.remove(guid)
    }

    pub fn contains(&self, guid: &Uuid) -> bool {
        self.instances.contains_key(guid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn guids(&self) -> Vec<Uuid> {
        self.instances.keys().copied().collect()
    }

    pub fn instances_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Instance> + 'a {
        self.instances.values().filter(move |i| i.type_name == type_name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
