//! End-to-end scenarios over the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bubl_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Value(i32);

#[derive(Debug, Clone, PartialEq)]
struct Unit {
    name: String,
}

fn positions(world: &mut World) -> Vec<(EntityId, Position)> {
    let mut out = Vec::new();
    world.for_each_entity::<(&Position,), _>(|e, (p,)| out.push((e, *p)));
    out
}

fn values(world: &mut World) -> Vec<i32> {
    let mut out = Vec::new();
    world.for_each::<(&Value,), _>(|(v,)| out.push(v.0));
    out
}

#[test]
fn two_entities_one_removal() {
    let mut world = World::new();
    let e1 = world.create_entity((Position { x: 1, y: 3 },));
    let e2 = world.create_entity((Position { x: 5, y: 2 }, Value(123)));

    let mut seen = positions(&mut world);
    seen.sort_by_key(|(e, _)| *e);
    assert_eq!(
        seen,
        vec![(e1, Position { x: 1, y: 3 }), (e2, Position { x: 5, y: 2 })]
    );
    assert_eq!(values(&mut world), vec![123]);

    world.remove_component::<Value>(e2).unwrap();

    assert!(values(&mut world).is_empty());
    let mut seen = positions(&mut world);
    seen.sort_by_key(|(e, _)| *e);
    assert_eq!(
        seen,
        vec![(e1, Position { x: 1, y: 3 }), (e2, Position { x: 5, y: 2 })]
    );
    assert_eq!(
        world.entity_location(e1).unwrap().archetype,
        world.entity_location(e2).unwrap().archetype
    );
}

#[test]
fn creation_grows_exactly_one_archetype() {
    let mut world = World::new();
    world.create_entity((Position { x: 0, y: 0 }, Value(0)));
    let before = world.archetypes().map(|a| a.len()).collect::<Vec<_>>();

    let e = world.create_entity((Value(1), Position { x: 1, y: 1 }));
    let loc = world.entity_location(e).unwrap();
    let arch = world.archetype(loc.archetype).unwrap();

    let reg = world.registry();
    let expected = CompositeType::new([
        reg.descriptor_of::<Position>(),
        reg.descriptor_of::<Value>(),
    ]);
    assert!(arch.composite_type().equal(&expected));
    assert_eq!(arch.len(), before[0] + 1);
    assert_eq!(world.archetype_count(), 1);
}

#[test]
fn successive_removals_leave_entity_untracked() {
    let mut world = World::new();
    let e = world.create_entity((
        Position { x: 5, y: 2 },
        Value(123),
        Unit { name: "a".to_owned() },
    ));

    world.remove_component::<Position>(e).unwrap();
    assert_eq!(world.get_component::<Value>(e), Some(&Value(123)));
    world.remove_component::<Unit>(e).unwrap();
    assert_eq!(world.get_component::<Value>(e), Some(&Value(123)));
    world.remove_component::<Value>(e).unwrap();

    assert!(!world.contains(e));
    assert!(positions(&mut world).is_empty());
    assert_eq!(world.archetype_count(), 0);
    // Further removals on the vanished entity are silent.
    assert!(world.remove_component::<Value>(e).is_ok());
}

#[test]
fn emptied_archetype_is_not_scanned() {
    let mut world = World::new();
    let e = world.create_entity((Position { x: 0, y: 0 }, Value(9)));
    let old = world.entity_location(e).unwrap().archetype;
    world.remove_component::<Position>(e).unwrap();

    assert!(world.archetype(old).is_none());
    assert!(world.archetypes().all(|a| a.id() != old));
    assert_eq!(values(&mut world), vec![9]);
}

#[test]
fn string_components_queryable_and_removable() {
    let mut world = World::new();
    let names = ["alpha", "beta", "gamma", "delta"];
    let entities: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            world.create_entity((
                Unit { name: (*n).to_owned() },
                Position { x: i as i32, y: 0 },
            ))
        })
        .collect();

    world.remove_component::<Unit>(entities[0]).unwrap();

    let mut remaining: Vec<_> = world
        .query::<(&Unit, &Position)>()
        .map(|(_, (u, p))| (u.name.clone(), p.x))
        .collect();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            ("beta".to_owned(), 1),
            ("delta".to_owned(), 3),
            ("gamma".to_owned(), 2),
        ]
    );
}

#[test]
fn swap_remove_keeps_every_row_addressed() {
    let mut world = World::new();
    let entities: Vec<_> = (0..16)
        .map(|i| world.create_entity((Position { x: i, y: -i }, Value(i))))
        .collect();

    for &e in entities.iter().step_by(3) {
        world.remove_component::<Value>(e).unwrap();
    }

    for (i, &e) in entities.iter().enumerate() {
        let i = i as i32;
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: i, y: -i }));
        let expected = (i % 3 != 0).then_some(Value(i));
        assert_eq!(world.get_component::<Value>(e).copied(), expected);
    }
}

/// Counts how many times values of this type have been dropped.
#[derive(Debug)]
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn resources_dropped_exactly_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = || DropCounter(Arc::clone(&drops));

    let mut world = World::new();
    let a = world.create_entity((counter(), Value(1)));
    let b = world.create_entity((counter(), Value(2)));
    let c = world.create_entity((counter(), Unit { name: "c".into() }));
    let _d = world.create_entity((counter(),));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // Migration moves the value; nothing is dropped.
    world.remove_component::<Value>(a).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    world.remove_component::<DropCounter>(b).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    // Overwriting drops the old value.
    world.insert_component(c, counter()).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);

    assert!(world.destroy_entity(c));
    assert_eq!(drops.load(Ordering::SeqCst), 3);

    drop(world);
    assert_eq!(drops.load(Ordering::SeqCst), 5);
}

#[test]
#[should_panic(expected = "registered with a different registry")]
fn bundle_built_for_another_world_is_rejected() {
    let mut world = World::new();
    world.create_entity((Value(1),));

    let other = World::new();
    let bundle = ComponentBundle::new().with(other.registry(), Unit { name: "elsewhere".to_owned() });
    world.create_entity(bundle);
}

#[test]
fn bundles_built_with_the_world_registry_mix_freely() {
    let mut world = World::new();
    world.create_entity((Value(1),));
    let bundle = ComponentBundle::new()
        .with(world.registry(), Unit { name: "here".to_owned() })
        .with(world.registry(), Value(2));
    let e = world.create_entity(bundle);
    assert_eq!(world.get_component::<Value>(e), Some(&Value(2)));
    assert_eq!(world.get_component::<Unit>(e).map(|u| u.name.as_str()), Some("here"));
}
