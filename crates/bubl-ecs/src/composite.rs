//! Composite types: the schema of an archetype.
//!
//! A [`CompositeType`] is a set of component types plus a bijection between
//! each component's identity and its column index inside an archetype.
//! Columns are always dense and assigned in ascending [`ComponentId`] order,
//! so two composite types holding the same set lay their columns out
//! identically.

use std::collections::BTreeMap;

use crate::component::{ComponentId, ComponentType};
use crate::EcsError;

/// The set of component types attached to an entity, or shared by every row
/// of an archetype.
///
/// Equality only considers the set of identities.
#[derive(Debug, Clone, Default)]
pub struct CompositeType {
    /// Descriptors keyed by identity (ascending).
    types: BTreeMap<ComponentId, ComponentType>,
    /// Column index -> identity. Sorted ascending.
    columns: Vec<ComponentId>,
}

impl CompositeType {
    /// Build a composite type from a set of descriptors. Duplicates collapse.
    pub fn new(descriptors: impl IntoIterator<Item = ComponentType>) -> Self {
        let types: BTreeMap<_, _> = descriptors.into_iter().map(|d| (d.id, d)).collect();
        let columns = types.keys().copied().collect();
        Self { types, columns }
    }

    /// The composite type with no components.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the type has no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of components (and therefore columns).
    #[inline]
    pub fn size(&self) -> usize {
        self.types.len()
    }

    /// Whether `id` is part of this type.
    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.types.contains_key(&id)
    }

    /// Component identities in column order.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.columns
    }

    /// Descriptors in column order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentType> + '_ {
        self.columns.iter().map(|id| &self.types[id])
    }

    /// Byte size of one `id` value.
    pub fn type_size(&self, id: ComponentId) -> Result<usize, EcsError> {
        self.type_descriptor(id).map(|d| d.size)
    }

    /// Descriptor for `id`.
    pub fn type_descriptor(&self, id: ComponentId) -> Result<ComponentType, EcsError> {
        self.types
            .get(&id)
            .copied()
            .ok_or(EcsError::ComponentNotFound { component: id })
    }

    /// True iff every component of `other` is also in `self`.
    pub fn is_superset_of(&self, other: &CompositeType) -> bool {
        other.types.keys().all(|id| self.types.contains_key(id))
    }

    /// True iff both types hold exactly the same set of components.
    pub fn equal(&self, other: &CompositeType) -> bool {
        self.size() == other.size() && self.is_superset_of(other)
    }

    /// Column index of `id`, or `None` if it is not part of this type.
    #[inline]
    pub fn column_of(&self, id: ComponentId) -> Option<usize> {
        self.columns.binary_search(&id).ok()
    }

    /// Identity stored in `column`, or `None` if out of range.
    #[inline]
    pub fn component_of(&self, column: usize) -> Option<ComponentId> {
        self.columns.get(column).copied()
    }

    /// Remove one component. Columns after it shift down by one.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<(), EcsError> {
        if self.types.remove(&id).is_none() {
            return Err(EcsError::ComponentNotFound { component: id });
        }
        let column = self
            .column_of(id)
            .expect("column map out of sync with component set");
        self.columns.remove(column);
        Ok(())
    }

    /// A copy of this type extended with `descriptor`.
    pub fn with_component(&self, descriptor: ComponentType) -> Self {
        let mut extended = self.clone();
        if extended.types.insert(descriptor.id, descriptor).is_none() {
            let at = extended
                .columns
                .binary_search(&descriptor.id)
                .unwrap_or_else(|at| at);
            extended.columns.insert(at, descriptor.id);
        }
        extended
    }
}

impl PartialEq for CompositeType {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for CompositeType {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
