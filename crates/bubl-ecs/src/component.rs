//! Component type identity and metadata.
//!
//! Component types are registered lazily: the first time a Rust type is seen
//! by a [`TypeRegistry`] it receives the next [`ComponentId`] from the
//! registry's allocator, along with a [`ComponentType`] descriptor capturing
//! its layout and type-erased drop operation. Later lookups are plain reads.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ptr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::IdAllocator;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker for types that can be stored as components.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Raw numeric value.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentVtable -- type-erased operations for a component type
// ---------------------------------------------------------------------------

/// Function pointers for type-erased handling of component values.
///
/// Moving a value is a raw byte copy, so the only operation that needs the
/// concrete type is dropping it.
#[derive(Clone, Copy)]
pub struct ComponentVtable {
    /// Drop a single value in place.
    pub(crate) drop_fn: unsafe fn(*mut u8),
    /// Whether `drop_fn` does anything at all.
    pub(crate) needs_drop: bool,
}

impl ComponentVtable {
    /// Create a vtable for a concrete component type `T`.
    pub fn of<T: Component>() -> Self {
        unsafe fn drop_fn_impl<T>(ptr: *mut u8) {
            ptr::drop_in_place(ptr as *mut T);
        }

        Self {
            drop_fn: drop_fn_impl::<T>,
            needs_drop: std::mem::needs_drop::<T>(),
        }
    }

    /// Drop the value at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid, initialised value of the type this vtable
    /// was created for, and the value must not be used afterwards.
    #[inline]
    pub unsafe fn drop_value(&self, ptr: *mut u8) {
        if self.needs_drop {
            (self.drop_fn)(ptr);
        }
    }
}

impl fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVtable")
            .field("needs_drop", &self.needs_drop)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Descriptor of a registered component type.
#[derive(Debug, Clone, Copy)]
pub struct ComponentType {
    /// Identity assigned on first use.
    pub id: ComponentId,
    /// `std::any::type_name::<T>()`
    pub name: &'static str,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
    pub(crate) vtable: ComponentVtable,
}

impl ComponentType {
    fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            type_id: TypeId::of::<T>(),
            vtable: ComponentVtable::of::<T>(),
        }
    }

    /// The type-erased operations for this component type.
    #[inline]
    pub fn vtable(&self) -> &ComponentVtable {
        &self.vtable
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryInner {
    /// Rust `TypeId` -> assigned identity.
    by_type: HashMap<TypeId, ComponentId>,
    /// Indexed by `ComponentId.0`.
    types: Vec<ComponentType>,
}

/// Maps Rust types to [`ComponentId`]s and their descriptors.
///
/// Registration happens on first use and can be triggered concurrently from
/// several threads through a shared reference; each type still receives
/// exactly one identity.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    ids: IdAllocator,
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    /// Create an empty registry whose first identity is `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity of `T`, allocating one on first use.
    pub fn identity_of<T: Component>(&self) -> ComponentId {
        self.descriptor_of::<T>().id
    }

    /// The descriptor of `T`, registering it on first use.
    pub fn descriptor_of<T: Component>(&self) -> ComponentType {
        let rust_type = TypeId::of::<T>();
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.by_type.get(&rust_type) {
                return inner.types[id.0 as usize];
            }
        }

        let mut inner = self.inner.write();
        // Another thread may have won the race between the two locks.
        if let Some(&id) = inner.by_type.get(&rust_type) {
            return inner.types[id.0 as usize];
        }
        let id = ComponentId(self.ids.next());
        let descriptor = ComponentType::of::<T>(id);
        debug_assert_eq!(inner.types.len(), id.0 as usize);
        inner.types.push(descriptor);
        inner.by_type.insert(rust_type, id);
        tracing::trace!(component = %id, name = descriptor.name, "registered component type");
        descriptor
    }

    /// The identity of `T` if it has already been registered.
    pub fn lookup<T: Component>(&self) -> Option<ComponentId> {
        self.inner.read().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The descriptor for a known identity.
    pub fn descriptor(&self, id: ComponentId) -> Option<ComponentType> {
        self.inner.read().types.get(id.0 as usize).copied()
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.inner.read().types.len()
    }

    /// Whether no component type has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
