//! Query system for iterating entities by component set.
//!
//! A query names a tuple of component accesses, `&T` (read) or `&mut T`
//! (write). Every archetype whose composite type is a superset of the
//! requested components matches. For each matching archetype the column base
//! pointers are resolved once, tagged with their element size, and every row
//! is then fetched by plain pointer arithmetic.
//!
//! ## Soundness
//!
//! Read-only queries use [`World::query`], which takes `&self` and rejects
//! mutable items. Everything else borrows the world mutably, so the column
//! buffers cannot be reallocated while items are alive. A query that names
//! the same component mutably twice, or both mutably and immutably, panics
//! before any item is produced.

use std::marker::PhantomData;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentType, TypeRegistry};
use crate::composite::CompositeType;
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// ColumnPtr
// ---------------------------------------------------------------------------

/// Base address of one column, plus the byte size of its elements.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPtr {
    base: *mut u8,
    size: usize,
}

impl ColumnPtr {
    /// Address of the value at `row`.
    ///
    /// # Safety
    ///
    /// `row` must be in bounds for the column this pointer was resolved from.
    #[inline]
    unsafe fn at(self, row: usize) -> *mut u8 {
        self.base.add(row * self.size)
    }
}

// ---------------------------------------------------------------------------
// QueryItem trait -- describes one element in a query tuple
// ---------------------------------------------------------------------------

/// A single element of a query: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The output type yielded per row.
    type Item<'w>;
    /// The component type accessed.
    type Target: Component;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;

    /// Turn the address of a value into an item.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live `Self::Target` that outlives `'w`, and the
    /// caller must uphold the aliasing rules for the returned reference.
    unsafe fn fetch<'w>(ptr: *mut u8) -> Self::Item<'w>;
}

impl<T: Component> QueryItem for &T {
    type Item<'w> = &'w T;
    type Target = T;
    const MUTABLE: bool = false;

    #[inline]
    unsafe fn fetch<'w>(ptr: *mut u8) -> Self::Item<'w> {
        &*(ptr as *const T)
    }
}

impl<T: Component> QueryItem for &mut T {
    type Item<'w> = &'w mut T;
    type Target = T;
    const MUTABLE: bool = true;

    #[inline]
    unsafe fn fetch<'w>(ptr: *mut u8) -> Self::Item<'w> {
        &mut *(ptr as *mut T)
    }
}

// ---------------------------------------------------------------------------
// Query trait -- describes a tuple of QueryItems
// ---------------------------------------------------------------------------

/// A tuple of query items: `(&A,)`, `(&mut A, &B)`, up to six elements.
pub trait Query {
    /// The per-row output type.
    type Item<'w>;
    /// Whether any item in this query borrows mutably.
    const HAS_MUTABLE: bool;

    /// Descriptor and mutability of every item, in tuple order. Registers the
    /// component types on first use.
    fn access(registry: &TypeRegistry) -> Vec<(ComponentType, bool)>;

    /// Fetch one row. `columns` holds one pointer per item, in tuple order.
    ///
    /// # Safety
    ///
    /// `columns` must have been resolved from an archetype matching this
    /// query, `row` must be in bounds for it, and the access pattern must be
    /// free of aliasing.
    unsafe fn fetch_row<'w>(columns: &[ColumnPtr], row: usize) -> Self::Item<'w>;
}

/// Panics if the same component is accessed mutably twice, or both mutably
/// and immutably.
fn validate_no_access_conflicts(access: &[(ComponentType, bool)]) {
    for (i, (a, a_mut)) in access.iter().enumerate() {
        for (b, b_mut) in &access[i + 1..] {
            if a.id != b.id {
                continue;
            }
            if *a_mut && *b_mut {
                panic!(
                    "query contains duplicate mutable access to component {}",
                    a.name
                );
            }
            if *a_mut || *b_mut {
                panic!(
                    "query contains overlapping read and mutable access to component {}",
                    a.name
                );
            }
        }
    }
}

macro_rules! impl_query {
    ($($name:ident $index:tt),+) => {
        impl<$($name: QueryItem),+> Query for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            const HAS_MUTABLE: bool = false $(|| $name::MUTABLE)+;

            fn access(registry: &TypeRegistry) -> Vec<(ComponentType, bool)> {
                vec![$( (registry.descriptor_of::<$name::Target>(), $name::MUTABLE) ),+]
            }

            #[inline]
            unsafe fn fetch_row<'w>(columns: &[ColumnPtr], row: usize) -> Self::Item<'w> {
                ($( $name::fetch(columns.get_unchecked($index).at(row)), )+)
            }
        }
    };
}

impl_query!(A 0);
impl_query!(A 0, B 1);
impl_query!(A 0, B 1, C 2);
impl_query!(A 0, B 1, C 2, D 3);
impl_query!(A 0, B 1, C 2, D 3, E 4);
impl_query!(A 0, B 1, C 2, D 3, E 4, F 5);

// ---------------------------------------------------------------------------
// Archetype matching
// ---------------------------------------------------------------------------

/// One matching archetype with its columns resolved for a query.
struct MatchedArchetype<'w> {
    entities: &'w [EntityId],
    columns: Vec<ColumnPtr>,
}

/// Resolve the column pointers for `access` in `archetype`, or `None` if the
/// archetype does not carry every requested component.
fn resolve_columns(
    archetype: &Archetype,
    required: &CompositeType,
    access: &[(ComponentType, bool)],
) -> Option<Vec<ColumnPtr>> {
    let ty = archetype.composite_type();
    if !ty.is_superset_of(required) {
        return None;
    }
    access
        .iter()
        .map(|(desc, _)| {
            let column = archetype.column(ty.column_of(desc.id)?)?;
            assert!(
                column.descriptor().type_id == desc.type_id,
                "column {} of archetype {} does not store {}",
                desc.id,
                archetype.id(),
                desc.name
            );
            Some(ColumnPtr {
                base: column.base_ptr(),
                size: desc.size,
            })
        })
        .collect()
}

/// Validate a query's access pattern and return it with the component set
/// an archetype must carry to match.
fn prepare<Q: Query>(registry: &TypeRegistry) -> (Vec<(ComponentType, bool)>, CompositeType) {
    let access = Q::access(registry);
    validate_no_access_conflicts(&access);
    let required = CompositeType::new(access.iter().map(|(desc, _)| *desc));
    (access, required)
}

fn match_archetypes<'w>(
    archetypes: impl Iterator<Item = &'w Archetype>,
    required: &CompositeType,
    access: &[(ComponentType, bool)],
) -> Vec<MatchedArchetype<'w>> {
    archetypes
        .filter_map(|archetype| {
            let columns = resolve_columns(archetype, required, access)?;
            Some(MatchedArchetype {
                entities: archetype.entities(),
                columns,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cursor shared by both iterators
// ---------------------------------------------------------------------------

struct Cursor<'w> {
    matched: Vec<MatchedArchetype<'w>>,
    arch_cursor: usize,
    row_cursor: usize,
}

impl<'w> Cursor<'w> {
    fn new(matched: Vec<MatchedArchetype<'w>>) -> Self {
        Self {
            matched,
            arch_cursor: 0,
            row_cursor: 0,
        }
    }

    /// Advance to the next row, returning it with its entity and columns.
    fn advance(&mut self) -> Option<(EntityId, &[ColumnPtr], usize)> {
        loop {
            let matched = self.matched.get(self.arch_cursor)?;
            if self.row_cursor < matched.entities.len() {
                let row = self.row_cursor;
                self.row_cursor += 1;
                let matched = &self.matched[self.arch_cursor];
                return Some((matched.entities[row], matched.columns.as_slice(), row));
            }
            self.arch_cursor += 1;
            self.row_cursor = 0;
        }
    }

    fn remaining(&self) -> usize {
        let mut rest = self.matched[self.arch_cursor.min(self.matched.len())..]
            .iter()
            .map(|m| m.entities.len());
        match rest.next() {
            Some(current) => current - self.row_cursor + rest.sum::<usize>(),
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// QueryIter (read-only)
// ---------------------------------------------------------------------------

/// Iterator that yields `(EntityId, Q::Item)` for all matching entities.
/// Produced by [`World::query`].
pub struct QueryIter<'w, Q: Query> {
    cursor: Cursor<'w>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let (entity, columns, row) = self.cursor.advance()?;
        // SAFETY: the query holds only shared items and `'w` borrows the
        // world immutably, so the columns stay valid and unaliased by writers.
        let item = unsafe { Q::fetch_row(columns, row) };
        Some((entity, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.cursor.remaining();
        (n, Some(n))
    }
}

// ---------------------------------------------------------------------------
// QueryIterMut (mutable)
// ---------------------------------------------------------------------------

/// Iterator that yields `(EntityId, Q::Item)` for all matching entities,
/// allowing mutable items. Produced by [`World::query_mut`].
///
/// Each row is yielded at most once and the access pattern has been checked
/// for aliasing, so the `&mut` items it hands out never overlap.
pub struct QueryIterMut<'w, Q: Query> {
    cursor: Cursor<'w>,
    _marker: PhantomData<(Q, &'w mut World)>,
}

impl<'w, Q: Query> Iterator for QueryIterMut<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let (entity, columns, row) = self.cursor.advance()?;
        // SAFETY: the iterator was built from `&'w mut World`, rows are
        // visited once, and conflicting access was rejected up front.
        let item = unsafe { Q::fetch_row(columns, row) };
        Some((entity, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.cursor.remaining();
        (n, Some(n))
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Invoke `f` once for every entity whose type contains all of `Q`'s
    /// components, archetype by archetype in ascending id order.
    ///
    /// ```ignore
    /// world.for_each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
    ///     pos.x += vel.dx;
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `Q` accesses one component mutably more than once, or both
    /// mutably and immutably.
    pub fn for_each<'w, Q, F>(&'w mut self, mut f: F)
    where
        Q: Query,
        F: FnMut(Q::Item<'w>),
    {
        self.for_each_entity::<Q, _>(|_, item| f(item));
    }

    /// Like [`for_each`](Self::for_each), also passing each entity's id.
    pub fn for_each_entity<'w, Q, F>(&'w mut self, mut f: F)
    where
        Q: Query,
        F: FnMut(EntityId, Q::Item<'w>),
    {
        let (access, required) = prepare::<Q>(&self.registry);
        for archetype in self.archetypes.values_mut() {
            let archetype: &'w Archetype = archetype;
            let Some(columns) = resolve_columns(archetype, &required, &access) else {
                continue;
            };
            for (row, &entity) in archetype.entities().iter().enumerate() {
                // SAFETY: `row` is in bounds for the resolved columns, the
                // world is borrowed mutably for `'w`, and each row is visited
                // once.
                f(entity, unsafe { Q::fetch_row(&columns, row) });
            }
        }
    }

    /// Read-only query over all entities carrying `Q`'s components.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a `&mut` item; use
    /// [`query_mut`](Self::query_mut) instead.
    pub fn query<Q: Query>(&self) -> QueryIter<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "World::query() cannot be used with mutable query items; use query_mut() instead"
        );
        let (access, required) = prepare::<Q>(&self.registry);
        QueryIter {
            cursor: Cursor::new(match_archetypes(self.archetypes.values(), &required, &access)),
            _marker: PhantomData,
        }
    }

    /// Query that may contain `&mut` items.
    ///
    /// # Panics
    ///
    /// Panics on conflicting access to the same component.
    pub fn query_mut<Q: Query>(&mut self) -> QueryIterMut<'_, Q> {
        let (access, required) = prepare::<Q>(&self.registry);
        let archetypes = self.archetypes.values_mut().map(|a| &*a);
        QueryIterMut {
            cursor: Cursor::new(match_archetypes(archetypes, &required, &access)),
            _marker: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: i32,
        dy: i32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Frozen;

    fn populated() -> World {
        let mut world = World::new();
        world.create_entity((Position { x: 0, y: 0 }, Velocity { dx: 1, dy: 2 }));
        world.create_entity((Position { x: 10, y: 10 },));
        world.create_entity((
            Position { x: 5, y: 5 },
            Velocity { dx: -1, dy: 0 },
            Health(3),
        ));
        world
    }

    #[test]
    fn for_each_visits_superset_archetypes() {
        let mut world = populated();
        let mut seen = Vec::new();
        world.for_each::<(&Position, &Velocity), _>(|(pos, vel)| {
            seen.push((pos.x, vel.dx));
        });
        assert_eq!(seen, vec![(0, 1), (5, -1)]);
    }

    #[test]
    fn for_each_mutation_is_visible() {
        let mut world = populated();
        world.for_each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
            pos.x += vel.dx;
            pos.y += vel.dy;
        });
        let mut positions: Vec<_> = world.query::<(&Position,)>().map(|(_, (p,))| *p).collect();
        positions.sort_by_key(|p| p.x);
        assert_eq!(
            positions,
            vec![
                Position { x: 1, y: 2 },
                Position { x: 4, y: 5 },
                Position { x: 10, y: 10 },
            ]
        );
    }

    #[test]
    fn for_each_entity_passes_ids() {
        let mut world = World::new();
        let a = world.create_entity((Health(1),));
        let b = world.create_entity((Health(2), Frozen));
        let mut seen = Vec::new();
        world.for_each_entity::<(&Health,), _>(|entity, (health,)| seen.push((entity, health.0)));
        assert_eq!(seen, vec![(a, 1), (b, 2)]);
    }

    #[test]
    fn zero_sized_components_can_be_queried() {
        let mut world = World::new();
        world.create_entity((Frozen, Health(7)));
        world.create_entity((Frozen,));
        assert_eq!(world.query::<(&Frozen,)>().count(), 2);
        let hp: Vec<_> = world
            .query::<(&Health, &Frozen)>()
            .map(|(_, (h, _))| h.0)
            .collect();
        assert_eq!(hp, vec![7]);
    }

    #[test]
    fn query_unregistered_component_matches_nothing() {
        let world = populated();
        assert_eq!(world.query::<(&Frozen,)>().count(), 0);
    }

    #[test]
    fn query_mut_updates_values() {
        let mut world = populated();
        for (_, (hp,)) in world.query_mut::<(&mut Health,)>() {
            hp.0 += 10;
        }
        let hp: Vec<_> = world.query::<(&Health,)>().map(|(_, (h,))| h.0).collect();
        assert_eq!(hp, vec![13]);
    }

    #[test]
    fn size_hint_is_exact() {
        let world = populated();
        let mut iter = world.query::<(&Position,)>();
        assert_eq!(iter.size_hint(), (3, Some(3)));
        iter.next();
        assert_eq!(iter.size_hint(), (2, Some(2)));
    }

    #[test]
    fn shared_duplicate_reads_are_allowed() {
        let world = populated();
        assert_eq!(world.query::<(&Position, &Position)>().count(), 3);
    }

    #[test]
    #[should_panic(expected = "cannot be used with mutable query items")]
    fn query_rejects_mutable_items() {
        let world = populated();
        let _ = world.query::<(&mut Position,)>();
    }

    #[test]
    #[should_panic(expected = "duplicate mutable access")]
    fn duplicate_mutable_access_panics() {
        let mut world = populated();
        world.for_each::<(&mut Position, &mut Position), _>(|_| {});
    }

    #[test]
    #[should_panic(expected = "overlapping read and mutable access")]
    fn overlapping_access_panics() {
        let mut world = populated();
        let _ = world.query_mut::<(&Position, &mut Position)>();
    }
}
