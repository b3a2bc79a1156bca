//! The [`World`] is the top-level container for the ECS. It owns the id
//! allocators, the component type registry, the entity directory and all
//! archetype storage, and implements structural changes (creation, component
//! removal and insertion, destruction) as archetype migrations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId};
use crate::bundle::{Bundle, ComponentBundle, ComponentSet};
use crate::component::{Component, ComponentId, TypeRegistry};
use crate::composite::CompositeType;
use crate::entity::{EntityId, EntityLocation, EntityRecord};
use crate::id::IdAllocator;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time summary of a world, suitable for logging or dumping as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldStats {
    pub entity_count: usize,
    pub archetype_count: usize,
    pub component_types: usize,
    pub archetypes: Vec<ArchetypeStats>,
}

/// Per-archetype part of [`WorldStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchetypeStats {
    pub id: ArchetypeId,
    pub components: Vec<&'static str>,
    pub rows: usize,
    pub bytes: usize,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Each world owns fresh id allocators and a fresh [`TypeRegistry`], so ids
/// from one world mean nothing in another.
pub struct World {
    /// Component type registry.
    pub(crate) registry: TypeRegistry,
    entity_ids: IdAllocator,
    archetype_ids: IdAllocator,
    /// All live archetypes, ordered by id (creation order).
    pub(crate) archetypes: BTreeMap<ArchetypeId, Archetype>,
    /// Sorted component-id set -> archetype. At most one archetype per set.
    archetype_index: HashMap<Vec<ComponentId>, ArchetypeId>,
    /// Entity directory.
    entities: HashMap<EntityId, EntityRecord>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            registry: TypeRegistry::new(),
            entity_ids: IdAllocator::new(),
            archetype_ids: IdAllocator::new(),
            archetypes: BTreeMap::new(),
            archetype_index: HashMap::new(),
            entities: HashMap::new(),
        }
    }

    /// The world's component type registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype for a composite type.
    fn find_or_create_archetype(&mut self, ty: &CompositeType) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(ty.component_ids()) {
            return id;
        }
        let id = ArchetypeId(self.archetype_ids.next());
        self.archetypes.insert(id, Archetype::new(id, ty.clone()));
        self.archetype_index.insert(ty.component_ids().to_vec(), id);
        debug!(archetype = %id, components = ?ty.component_ids(), "created archetype");
        id
    }

    /// Delete `id` from the directory if it holds no rows.
    fn delete_archetype_if_empty(&mut self, id: ArchetypeId) {
        if !self.archetypes.get(&id).is_some_and(Archetype::is_empty) {
            return;
        }
        if let Some(archetype) = self.archetypes.remove(&id) {
            self.archetype_index
                .remove(archetype.composite_type().component_ids());
            debug!(archetype = %id, "deleted empty archetype");
        }
    }

    fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        self.archetypes
            .get_mut(&id)
            .expect("entity directory points at a missing archetype")
    }

    /// After a swap-remove at `row`, point the entity that was moved into the
    /// hole at its new row.
    fn relocate_displaced(&mut self, displaced: Option<EntityId>, row: usize) {
        if let Some(moved) = displaced {
            let record = self
                .entities
                .get_mut(&moved)
                .expect("archetype row refers to an entity missing from the directory");
            record.location.row = row;
        }
    }

    /// Attach a migrated row to `archetype`. A target with no rows takes the
    /// row's buffers wholesale; otherwise the row is appended.
    fn attach_row(
        &mut self,
        archetype: ArchetypeId,
        entity: EntityId,
        row: ComponentBundle,
    ) -> usize {
        let target = self.archetype_mut(archetype);
        if target.is_empty() {
            target.replace_columns(row.into_columns(), vec![entity]);
            0
        } else {
            target.append_row(entity, row)
        }
    }

    /// Move the entity at `location` out of its archetype, keeping the values
    /// of components for which `keep` holds. Fixes the displaced entity's row
    /// and deletes the archetype if it became empty.
    fn detach_row(
        &mut self,
        location: EntityLocation,
        keep: impl Fn(ComponentId) -> bool,
    ) -> ComponentBundle {
        let (kept, displaced) = self
            .archetype_mut(location.archetype)
            .extract_row(location.row, keep);
        self.relocate_displaced(displaced, location.row);
        self.delete_archetype_if_empty(location.archetype);
        kept
    }

    /// Panics unless every value in `bundle` carries the identity this
    /// world's registry assigned to its Rust type.
    fn check_bundle(&self, bundle: &ComponentBundle) {
        for desc in bundle.descriptors() {
            let known = self.registry.descriptor(desc.id);
            assert!(
                known.is_some_and(|k| k.type_id == desc.type_id),
                "component {} ({}) in bundle was registered with a different registry; \
                 build bundles with World::registry()",
                desc.id,
                desc.name
            );
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity from a bundle of component values.
    ///
    /// ```ignore
    /// let e = world.create_entity((Position { x: 5, y: 2 }, Value(123)));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the bundle names the same component type twice, or if it is
    /// a [`ComponentBundle`] built against another world's registry.
    pub fn create_entity<B: Bundle>(&mut self, bundle: B) -> EntityId {
        let bundle = bundle.into_component_bundle(&self.registry);
        self.check_bundle(&bundle);
        let entity = EntityId(self.entity_ids.next());
        let ty = bundle.composite_type();
        let archetype = self.find_or_create_archetype(&ty);
        let row = self.archetype_mut(archetype).append_row(entity, bundle);
        self.entities.insert(
            entity,
            EntityRecord {
                location: EntityLocation { archetype, row },
                ty,
            },
        );
        trace!(entity = %entity, archetype = %archetype, row, "created entity");
        entity
    }

    /// Remove the components named by `S` from an entity, migrating it to the
    /// archetype of its reduced type. An entity left without components is
    /// removed from the world.
    ///
    /// Unknown entities are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotFound`] if the entity does not have one
    /// of the components. The world is left untouched in that case.
    pub fn remove_components<S: ComponentSet>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let Some(record) = self.entities.get(&entity) else {
            debug!(entity = %entity, "remove_components on unknown entity; nothing to do");
            return Ok(());
        };

        let mut removed = S::component_ids(&self.registry);
        removed.sort();
        removed.dedup();
        let mut reduced = record.ty.clone();
        for &component in &removed {
            reduced.remove_component(component)?;
        }
        let location = record.location;

        let migrated = self.detach_row(location, |id| reduced.contains(id));

        if reduced.is_empty() {
            self.entities.remove(&entity);
            debug!(entity = %entity, "entity has no components left; removed from world");
            return Ok(());
        }

        let target = self.find_or_create_archetype(&reduced);
        let row = self.attach_row(target, entity, migrated);
        trace!(
            entity = %entity,
            from = %location.archetype,
            to = %target,
            row,
            "migrated entity after component removal"
        );
        let record = self
            .entities
            .get_mut(&entity)
            .expect("entity vanished during migration");
        record.location = EntityLocation {
            archetype: target,
            row,
        };
        record.ty = reduced;
        Ok(())
    }

    /// Remove a single component type from an entity.
    ///
    /// See [`remove_components`](Self::remove_components).
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.remove_components::<(T,)>(entity)
    }

    /// Add components to an entity. Components it already has are
    /// overwritten in place; new ones migrate the entity to the archetype of
    /// its extended type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if the entity does not exist.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`create_entity`](Self::create_entity).
    pub fn insert_components<B: Bundle>(&mut self, entity: EntityId, bundle: B) -> Result<(), EcsError> {
        let mut values = bundle.into_component_bundle(&self.registry);
        self.check_bundle(&values);
        let record = self
            .entities
            .get(&entity)
            .ok_or(EcsError::EntityNotFound { entity })?;
        let location = record.location;
        let mut extended = record.ty.clone();

        self.archetype_mut(location.archetype)
            .overwrite_row(location.row, &mut values);
        if values.is_empty() {
            return Ok(());
        }

        for descriptor in values.composite_type().descriptors() {
            extended = extended.with_component(*descriptor);
        }

        let mut migrated = self.detach_row(location, |_| true);
        migrated.absorb(values);

        let target = self.find_or_create_archetype(&extended);
        let row = self.attach_row(target, entity, migrated);
        trace!(
            entity = %entity,
            from = %location.archetype,
            to = %target,
            row,
            "migrated entity after component insertion"
        );
        let record = self
            .entities
            .get_mut(&entity)
            .expect("entity vanished during migration");
        record.location = EntityLocation {
            archetype: target,
            row,
        };
        record.ty = extended;
        Ok(())
    }

    /// Add a single component to an entity.
    ///
    /// See [`insert_components`](Self::insert_components).
    pub fn insert_component<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        self.insert_components(entity, (value,))
    }

    /// Remove an entity and drop all of its components.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        let Some(record) = self.entities.remove(&entity) else {
            return false;
        };
        let location = record.location;
        let displaced = self.archetype_mut(location.archetype).remove_row(location.row);
        self.relocate_displaced(displaced, location.row);
        self.delete_archetype_if_empty(location.archetype);
        trace!(entity = %entity, "destroyed entity");
        true
    }

    // -- component access ---------------------------------------------------

    /// Whether the entity exists.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Get an immutable reference to a component on an entity.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let loc = self.entities.get(&entity)?.location;
        let component = self.registry.lookup::<T>()?;
        self.archetypes.get(&loc.archetype)?.get::<T>(loc.row, component)
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let loc = self.entities.get(&entity)?.location;
        let component = self.registry.lookup::<T>()?;
        self.archetypes
            .get_mut(&loc.archetype)?
            .get_mut::<T>(loc.row, component)
    }

    /// Check whether an entity has a given component type.
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let Some(record) = self.entities.get(&entity) else {
            return false;
        };
        self.registry
            .lookup::<T>()
            .is_some_and(|component| record.ty.contains(component))
    }

    /// The composite type of an entity.
    pub fn entity_type(&self, entity: EntityId) -> Option<&CompositeType> {
        self.entities.get(&entity).map(|r| &r.ty)
    }

    /// Which archetype and row hold the entity's data.
    pub fn entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entities.get(&entity).map(|r| r.location)
    }

    /// Total number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Total number of live archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All live archetypes in ascending id order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> + '_ {
        self.archetypes.values()
    }

    /// Look up an archetype by id.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(&id)
    }

    /// Summarise the world's current layout.
    pub fn stats(&self) -> WorldStats {
        let archetypes = self
            .archetypes
            .values()
            .map(|arch| ArchetypeStats {
                id: arch.id(),
                components: arch.composite_type().descriptors().map(|d| d.name).collect(),
                rows: arch.len(),
                bytes: arch.columns().iter().map(|c| c.byte_len()).sum(),
            })
            .collect();
        WorldStats {
            entity_count: self.entities.len(),
            archetype_count: self.archetypes.len(),
            component_types: self.registry.len(),
            archetypes,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
