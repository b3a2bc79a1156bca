//! Owned sets of component values.
//!
//! A [`ComponentBundle`] holds one type-erased value per component type,
//! sorted by [`ComponentId`]. It is what entity creation and insertion consume
//! and what archetype row extraction produces, so values travel between
//! archetypes without ever being reconstructed as typed Rust values.
//!
//! The [`Bundle`] trait lets tuples of plain component values be used
//! wherever a bundle is expected:
//!
//! ```ignore
//! world.create_entity((Position { x: 1, y: 3 }, Value(123)));
//! ```

use crate::archetype::Column;
use crate::component::{Component, ComponentId, ComponentType, TypeRegistry};
use crate::composite::CompositeType;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of component values, at most one per component type.
///
/// Each value lives in its own single-element [`Column`]; dropping the bundle
/// drops every value still inside it.
#[derive(Debug, Default)]
pub struct ComponentBundle {
    /// Sorted by component id, each holding exactly one value.
    columns: Vec<Column>,
}

impl ComponentBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the bundle, registering its type on first use.
    ///
    /// Pass the registry of the world the bundle is meant for
    /// ([`World::registry`](crate::world::World::registry)); worlds reject
    /// bundles whose ids were assigned by another registry.
    ///
    /// # Panics
    ///
    /// Panics if a component of the same type is already in the bundle.
    pub fn add<T: Component>(&mut self, registry: &TypeRegistry, value: T) {
        let mut column = Column::new(registry.descriptor_of::<T>());
        column.push(value);
        self.insert_column(column);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: Component>(mut self, registry: &TypeRegistry, value: T) -> Self {
        self.add(registry, value);
        self
    }

    /// Number of components in the bundle.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the bundle holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Component ids in ascending order.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.columns.iter().map(Column::component)
    }

    /// Descriptors of the held components, in ascending id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentType> + '_ {
        self.columns.iter().map(Column::descriptor)
    }

    /// Whether the bundle holds a value for `component`.
    pub fn contains(&self, component: ComponentId) -> bool {
        self.position(component).is_ok()
    }

    /// The composite type formed by the bundle's components.
    pub fn composite_type(&self) -> CompositeType {
        CompositeType::new(self.columns.iter().map(|c| *c.descriptor()))
    }

    /// Typed reference to the value stored for `component`.
    pub fn get<T: Component>(&self, component: ComponentId) -> Option<&T> {
        let index = self.position(component).ok()?;
        self.columns[index].get(0)
    }

    fn position(&self, component: ComponentId) -> Result<usize, usize> {
        self.columns
            .binary_search_by_key(&component, |c| c.component())
    }

    // -- crate-internal plumbing ---------------------------------------------

    pub(crate) fn insert_column(&mut self, column: Column) {
        debug_assert_eq!(column.len(), 1);
        match self.position(column.component()) {
            Ok(_) => panic!(
                "duplicate component type {} in bundle; each component type can only be added once",
                column.descriptor().name
            ),
            Err(at) => self.columns.insert(at, column),
        }
    }

    pub(crate) fn columns_mut(&mut self) -> std::slice::IterMut<'_, Column> {
        self.columns.iter_mut()
    }

    /// Drop the columns whose value has been moved out.
    pub(crate) fn retain_non_empty(&mut self) {
        self.columns.retain(|c| !c.is_empty());
    }

    /// Move every value of `other` into this bundle.
    pub(crate) fn absorb(&mut self, other: ComponentBundle) {
        for column in other.columns {
            self.insert_column(column);
        }
    }

    pub(crate) fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Anything that can be turned into a [`ComponentBundle`].
///
/// Implemented for [`ComponentBundle`] itself, for `()`, and for tuples of up
/// to eight components.
pub trait Bundle {
    /// Move the values into a type-erased bundle.
    ///
    /// # Panics
    ///
    /// Panics if the same component type appears twice.
    fn into_component_bundle(self, registry: &TypeRegistry) -> ComponentBundle;
}

impl Bundle for ComponentBundle {
    fn into_component_bundle(self, _registry: &TypeRegistry) -> ComponentBundle {
        self
    }
}

impl Bundle for () {
    fn into_component_bundle(self, _registry: &TypeRegistry) -> ComponentBundle {
        ComponentBundle::new()
    }
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component *types*, used to name the components to remove.
///
/// ```ignore
/// world.remove_components::<(Velocity, Health)>(entity)?;
/// ```
pub trait ComponentSet {
    /// The identities of the named components, in tuple order.
    fn component_ids(registry: &TypeRegistry) -> Vec<ComponentId>;
}

macro_rules! impl_tuples {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_component_bundle(self, registry: &TypeRegistry) -> ComponentBundle {
                let ($($name,)+) = self;
                let mut bundle = ComponentBundle::new();
                $( bundle.add(registry, $name); )+
                bundle
            }
        }

        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn component_ids(registry: &TypeRegistry) -> Vec<ComponentId> {
                vec![$( registry.identity_of::<$name>() ),+]
            }
        }
    };
}

impl_tuples!(A);
impl_tuples!(A, B);
impl_tuples!(A, B, C);
impl_tuples!(A, B, C, D);
impl_tuples!(A, B, C, D, E);
impl_tuples!(A, B, C, D, E, F);
impl_tuples!(A, B, C, D, E, F, G);
impl_tuples!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Pos(i32, i32);

    #[derive(Debug, PartialEq)]
    struct Name(String);

    #[test]
    fn tuple_bundle_sorted_by_id() {
        let reg = TypeRegistry::new();
        let pos_id = reg.identity_of::<Pos>();
        let name_id = reg.identity_of::<Name>();

        let bundle = (Name("a".to_owned()), Pos(5, 2)).into_component_bundle(&reg);
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.component_ids().collect::<Vec<_>>(), vec![pos_id, name_id]);
        assert_eq!(bundle.get::<Pos>(pos_id), Some(&Pos(5, 2)));
        assert_eq!(bundle.get::<Name>(name_id), Some(&Name("a".to_owned())));
        assert!(bundle.composite_type().contains(name_id));
    }

    #[test]
    #[should_panic(expected = "duplicate component type")]
    fn duplicate_component_panics() {
        let reg = TypeRegistry::new();
        let _ = (Pos(1, 1), Pos(2, 2)).into_component_bundle(&reg);
    }

    #[test]
    fn dropping_bundle_drops_values() {
        let reg = TypeRegistry::new();
        let tracker = Arc::new(());
        let bundle = (Arc::clone(&tracker),).into_component_bundle(&reg);
        assert_eq!(Arc::strong_count(&tracker), 2);
        drop(bundle);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn component_set_ids_follow_tuple_order() {
        let reg = TypeRegistry::new();
        let name_id = reg.identity_of::<Name>();
        let pos_id = reg.identity_of::<Pos>();
        assert_eq!(<(Pos, Name)>::component_ids(&reg), vec![pos_id, name_id]);
    }

    #[test]
    fn empty_bundle() {
        let reg = TypeRegistry::new();
        let bundle = ().into_component_bundle(&reg);
        assert!(bundle.is_empty());
        assert!(bundle.composite_type().is_empty());
    }
}
