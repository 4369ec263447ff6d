//! Identity registry: instance id → live object

use super::{ObjectHeader, ObjectRef};
use rustc_hash::{FxHashMap, FxHasher};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Id of an object that is not registered
pub const NO_INSTANCE: u64 = 0;

/// Reserved sentinel, never issued
pub const EMPTY_ID: u64 = u64::MAX;

/// Reserved sentinel, never issued
pub const DELETED_ID: u64 = u64::MAX - 1;

struct IdentityInner {
    objects: RefCell<FxHashMap<u64, NonNull<ObjectHeader>>>,
    counter: Cell<u64>,
    seed: u64,
}

/// Maps instance ids to live managed objects
///
/// Holds no references: entries disappear when the last handle to an
/// object drops.
#[derive(Clone)]
pub struct IdentityRegistry {
    inner: Rc<IdentityInner>,
}

impl IdentityRegistry {
    /// Create an empty identity registry
    pub fn new() -> Self {
        Self {
            inner: Rc::new(IdentityInner {
                objects: RefCell::new(FxHashMap::default()),
                counter: Cell::new(0),
                seed: rand::random(),
            }),
        }
    }

    /// Whether an id may be issued to an object
    pub fn is_valid_id(id: u64) -> bool {
        id != NO_INSTANCE && id != EMPTY_ID && id != DELETED_ID
    }

    /// Produce a fresh id, unique among live objects
    ///
    /// Hashes a per-registry seed, a random draw, a monotonic counter and
    /// the current time.
    pub fn generate_id(&self) -> u64 {
        loop {
            let counter = self.inner.counter.get().wrapping_add(1);
            self.inner.counter.set(counter);
            let time = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();

            let mut hasher = FxHasher::default();
            self.inner.seed.hash(&mut hasher);
            rand::random::<u64>().hash(&mut hasher);
            counter.hash(&mut hasher);
            time.hash(&mut hasher);
            let id = hasher.finish();

            if Self::is_valid_id(id) && !self.contains(id) {
                return id;
            }
        }
    }

    pub(super) fn register(&self, object: &ObjectRef) {
        let id = self.generate_id();
        object.header().instance_id.set(id);
        self.inner.objects.borrow_mut().insert(id, object.header);
    }

    pub(super) fn unregister(&self, id: u64, header: NonNull<ObjectHeader>) {
        let mut objects = self.inner.objects.borrow_mut();
        if objects.get(&id) == Some(&header) {
            objects.remove(&id);
        }
    }

    /// Find a live object by id
    pub fn lookup(&self, id: u64) -> Option<ObjectRef> {
        let header = *self.inner.objects.borrow().get(&id)?;
        // SAFETY: registered headers belong to live objects; they are removed
        // before the object is freed.
        Some(unsafe { ObjectRef::from_header(header) })
    }

    /// Check if an id belongs to a live object
    pub fn contains(&self, id: u64) -> bool {
        self.inner.objects.borrow().contains_key(&id)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.inner.objects.borrow().len()
    }

    /// Check if no objects are alive
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move an object to a new id
    ///
    /// If `new_id` is reserved or taken by another live object a fresh id is
    /// generated instead. Returns the id the object ends up with.
    pub fn rekey(&self, object: &ObjectRef, new_id: u64) -> u64 {
        let old_id = object.instance_id();
        if old_id == new_id {
            return new_id;
        }
        let new_id = if Self::is_valid_id(new_id) && !self.contains(new_id) {
            new_id
        } else {
            let fresh = self.generate_id();
            tracing::warn!(requested = new_id, assigned = fresh, "instance id unavailable");
            fresh
        };

        let mut objects = self.inner.objects.borrow_mut();
        if objects.get(&old_id) == Some(&object.header) {
            objects.remove(&old_id);
        }
        objects.insert(new_id, object.header);
        object.header().instance_id.set(new_id);
        tracing::trace!(old_id, new_id, "instance id changed");
        new_id
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("objects", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Obj;
    use crate::types::TypeRegistry;
    use rustc_hash::FxHashSet;

    struct Marker(#[allow(dead_code)] u32);

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let identity = IdentityRegistry::new();
        let ids: FxHashSet<u64> = (0..1000).map(|_| identity.generate_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|&id| IdentityRegistry::is_valid_id(id)));
    }

    #[test]
    fn test_reserved_ids() {
        assert!(!IdentityRegistry::is_valid_id(NO_INSTANCE));
        assert!(!IdentityRegistry::is_valid_id(EMPTY_ID));
        assert!(!IdentityRegistry::is_valid_id(DELETED_ID));
        assert!(IdentityRegistry::is_valid_id(42));
    }

    #[test]
    fn test_rekey_moves_entry() {
        let registry = TypeRegistry::new();
        let object = Obj::new(&registry, Marker(5));
        let old_id = object.instance_id();
        let identity = registry.identity();

        assert_eq!(identity.rekey(object.object(), 77), 77);
        assert_eq!(object.instance_id(), 77);
        assert!(identity.contains(77));
        assert!(!identity.contains(old_id));

        drop(object);
        assert!(!identity.contains(77));
    }

    #[test]
    fn test_rekey_onto_live_id_generates_fresh() {
        let registry = TypeRegistry::new();
        let a = Obj::new(&registry, Marker(1));
        let b = Obj::new(&registry, Marker(2));
        let assigned = registry.identity().rekey(b.object(), a.instance_id());
        assert_ne!(assigned, a.instance_id());
        assert_eq!(b.instance_id(), assigned);
        assert!(registry.identity().lookup(a.instance_id()).unwrap().ptr_eq(a.object()));
    }
}
