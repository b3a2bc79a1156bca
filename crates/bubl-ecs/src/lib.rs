//! bubl ECS -- archetype-based entity/component storage.
//!
//! Entities are stored in archetypes (one per unique set of component types)
//! using a Structure-of-Arrays layout: every archetype keeps one contiguous,
//! type-erased column per component, so iterating a component set is a walk
//! over densely packed memory. Adding or removing components migrates an
//! entity's row to the archetype of its new type.
//!
//! # Quick Start
//!
//! ```
//! use bubl_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Position { x: i32, y: i32 }
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Value(i32);
//!
//! let mut world = World::new();
//! let e1 = world.create_entity((Position { x: 1, y: 3 },));
//! let e2 = world.create_entity((Position { x: 5, y: 2 }, Value(123)));
//!
//! world.for_each::<(&mut Position,), _>(|(pos,)| pos.x += 1);
//! assert_eq!(world.get_component::<Position>(e1), Some(&Position { x: 2, y: 3 }));
//!
//! world.remove_component::<Value>(e2).unwrap();
//! assert_eq!(world.query::<(&Value,)>().count(), 0);
//! assert_eq!(world.archetype_count(), 1);
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod bundle;
#[allow(unsafe_code)]
pub mod component;
pub mod composite;
pub mod entity;
pub mod id;
#[allow(unsafe_code)]
pub mod query;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// A component identity was required but is not part of the type.
    #[error("component {component} is not part of the entity's type")]
    ComponentNotFound {
        component: component::ComponentId,
    },

    /// The entity does not exist (destroyed, emptied, or never allocated).
    #[error("entity {entity} does not exist")]
    EntityNotFound {
        entity: entity::EntityId,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId, Column};
    pub use crate::bundle::{Bundle, ComponentBundle, ComponentSet};
    pub use crate::component::{Component, ComponentId, ComponentType, TypeRegistry};
    pub use crate::composite::CompositeType;
    pub use crate::entity::{EntityId, EntityLocation};
    pub use crate::query::{Query, QueryItem, QueryIter, QueryIterMut};
    pub use crate::world::{ArchetypeStats, World, WorldStats};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
