//! Storage and iteration benchmarks.
//!
//! - `for_each`: integrate positions over a population spread across several
//!   archetypes.
//! - `create`: bulk entity creation from tuple bundles.
//! - `migration`: remove and re-insert one component on a slice of entities.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use bubl_ecs::entity::EntityId;
use bubl_ecs::world::World;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Copy)]
struct Health(u32);

#[derive(Debug, Clone)]
struct Label(String);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create `count` entities. Every entity has Position and Velocity; Health
/// and Label are attached at random, yielding four archetypes.
fn populate(count: usize, seed: u64) -> (World, Vec<EntityId>) {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut world = World::new();
    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let pos = Position {
            x: rng.gen_range(-100.0..100.0),
            y: rng.gen_range(-100.0..100.0),
        };
        let vel = Velocity {
            dx: rng.gen_range(-1.0..1.0),
            dy: rng.gen_range(-1.0..1.0),
        };
        let e = match (rng.gen_bool(0.5), rng.gen_bool(0.25)) {
            (true, true) => world.create_entity((pos, vel, Health(100), Label(format!("e{i}")))),
            (true, false) => world.create_entity((pos, vel, Health(100))),
            (false, true) => world.create_entity((pos, vel, Label(format!("e{i}")))),
            (false, false) => world.create_entity((pos, vel)),
        };
        entities.push(e);
    }
    (world, entities)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_for_each(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each");

    for &count in &[1_000usize, 10_000, 100_000] {
        let (mut world, _) = populate(count, 7);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &_count| {
            b.iter(|| {
                world.for_each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                });
            });
        });
    }

    group.finish();
}

fn bench_query_iter(c: &mut Criterion) {
    let (world, _) = populate(10_000, 11);
    c.bench_function("query_sum_health_10k", |b| {
        b.iter(|| {
            let total: u64 = world
                .query::<(&Health, &Position)>()
                .map(|(_, (h, _))| u64::from(h.0))
                .sum();
            black_box(total);
        });
    });
}

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_10k", |b| {
        b.iter(|| {
            let (world, entities) = populate(10_000, 3);
            black_box((world.entity_count(), entities.len()));
        });
    });
}

fn bench_migration(c: &mut Criterion) {
    let (mut world, entities) = populate(10_000, 5);
    let slice: Vec<EntityId> = entities.iter().step_by(10).copied().collect();

    c.bench_function("migrate_velocity_1k", |b| {
        b.iter(|| {
            for &e in &slice {
                world
                    .remove_component::<Velocity>(e)
                    .expect("entity has velocity");
            }
            for &e in &slice {
                world
                    .insert_component(e, Velocity { dx: 0.5, dy: 0.5 })
                    .expect("entity is alive");
            }
            black_box(world.archetype_count());
        });
    });
}

criterion_group!(
    benches,
    bench_for_each,
    bench_query_iter,
    bench_create,
    bench_migration,
);
criterion_main!(benches);
