//! Weak links to managed objects by instance id

use super::{IdentityRegistry, ObjectRef, NO_INSTANCE};
use crate::types::{Reflect, TypeBuilder};
use crate::value::Data;

/// Type attribute marking id-link types; their id is remapped on load
pub const ID_PTR_ATTRIBUTE: &str = "IdPtr";

/// Field holding the linked instance id
pub const OBJECT_ID_FIELD: &str = "ObjectId";

/// Non-owning reference to a managed object, stored as its instance id
///
/// Resolving a link whose object was dropped yields `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IdLink {
    object_id: u64,
}

impl IdLink {
    /// Link to nothing
    pub const NULL: IdLink = IdLink {
        object_id: NO_INSTANCE,
    };

    /// Link to an instance id
    pub fn new(object_id: u64) -> Self {
        Self { object_id }
    }

    /// Link to a live object
    pub fn to(object: &ObjectRef) -> Self {
        Self::new(object.instance_id())
    }

    /// Linked instance id
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Whether the link points nowhere
    pub fn is_null(&self) -> bool {
        self.object_id == NO_INSTANCE
    }

    /// Resolve the linked object if it is alive
    pub fn get(&self, identity: &IdentityRegistry) -> Option<ObjectRef> {
        if self.is_null() {
            return None;
        }
        identity.lookup(self.object_id)
    }

    /// Point at `object`, or at nothing
    pub fn set(&mut self, object: Option<&ObjectRef>) {
        self.object_id = object.map_or(NO_INSTANCE, ObjectRef::instance_id);
    }
}

impl Data for IdLink {}

impl Reflect for IdLink {
    const TYPE_NAME: &'static str = "IdLink";

    fn reflect(builder: &mut TypeBuilder<'_, Self>) {
        builder.attribute(ID_PTR_ATTRIBUTE);
        builder.default_constructor();
        builder.copy_constructor();
        builder.field(OBJECT_ID_FIELD, |link| &mut link.object_id);
        builder.const_method("IsNull", IdLink::is_null);
    }
}
