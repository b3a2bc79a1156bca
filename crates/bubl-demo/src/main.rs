//! Demo driver for the bubl ECS.
//!
//! Runs the canonical Position/Value/Unit walkthrough, then builds a random
//! population, integrates it for a few ticks, strips components off a slice
//! of it, and prints the resulting world layout as JSON.
//!
//! Environment:
//!
//! - `RUST_LOG` -- log filter (default `info`)
//! - `BUBL_DEMO_ENTITIES` -- size of the random population (default 1000)
//! - `BUBL_DEMO_SEED` -- PCG seed for the population (default 42)

use anyhow::{ensure, Context};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::Serialize;
use tracing::info;

use bubl_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

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
struct Value(i32);

#[derive(Debug, Clone, PartialEq)]
struct Unit {
    name: String,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct DemoConfig {
    entities: usize,
    seed: u64,
}

impl DemoConfig {
    const DEFAULT_ENTITIES: usize = 1000;
    const DEFAULT_SEED: u64 = 42;

    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            entities: env_or("BUBL_DEMO_ENTITIES", Self::DEFAULT_ENTITIES)?,
            seed: env_or("BUBL_DEMO_SEED", Self::DEFAULT_SEED)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e).with_context(|| format!("cannot read {key}")),
    }
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

fn print_positions(world: &mut World) {
    world.for_each_entity::<(&Position,), _>(|entity, (pos,)| {
        println!("  {entity}: Position({}, {})", pos.x, pos.y);
    });
}

fn print_values(world: &mut World) {
    world.for_each_entity::<(&Value,), _>(|entity, (value,)| {
        println!("  {entity}: Value({})", value.0);
    });
}

fn walkthrough() -> anyhow::Result<()> {
    let mut world = World::new();

    let e1 = world.create_entity((Position { x: 1, y: 3 },));
    let e2 = world.create_entity((
        Position { x: 5, y: 2 },
        Value(123),
        Unit {
            name: "a".to_owned(),
        },
    ));

    println!("positions:");
    print_positions(&mut world);
    println!("values:");
    print_values(&mut world);

    world
        .remove_component::<Value>(e2)
        .with_context(|| format!("removing Value from {e2}"))?;
    println!("after removing Value from {e2}:");
    print_values(&mut world);

    world
        .remove_component::<Unit>(e2)
        .with_context(|| format!("removing Unit from {e2}"))?;
    ensure!(
        world.entity_location(e1).map(|l| l.archetype) == world.entity_location(e2).map(|l| l.archetype),
        "{e1} and {e2} should share an archetype once their types match"
    );

    world
        .remove_component::<Position>(e2)
        .with_context(|| format!("removing Position from {e2}"))?;
    println!("after removing Position from {e2}:");
    print_positions(&mut world);
    ensure!(!world.contains(e2), "{e2} should be gone once it has no components");

    info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "walkthrough finished"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Random population
// ---------------------------------------------------------------------------

fn simulate(config: &DemoConfig) -> anyhow::Result<WorldStats> {
    let mut rng = Pcg64::seed_from_u64(config.seed);
    let mut world = World::new();
    let mut entities = Vec::with_capacity(config.entities);

    for i in 0..config.entities {
        let pos = Position {
            x: rng.gen_range(-500..500),
            y: rng.gen_range(-500..500),
        };
        let mut bundle = ComponentBundle::new().with(world.registry(), pos);
        if rng.gen_bool(0.7) {
            let vel = Velocity {
                dx: rng.gen_range(-3..=3),
                dy: rng.gen_range(-3..=3),
            };
            bundle.add(world.registry(), vel);
        }
        if rng.gen_bool(0.3) {
            bundle.add(world.registry(), Value(rng.gen_range(0..1000)));
        }
        if rng.gen_bool(0.1) {
            bundle.add(world.registry(), Unit { name: format!("unit-{i}") });
        }
        entities.push(world.create_entity(bundle));
    }
    info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "population created"
    );

    for _ in 0..10 {
        world.for_each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
            pos.x += vel.dx;
            pos.y += vel.dy;
        });
    }

    let mut stripped = 0usize;
    for &e in entities.iter().step_by(4) {
        if world.has_component::<Velocity>(e) {
            world
                .remove_component::<Velocity>(e)
                .with_context(|| format!("removing Velocity from {e}"))?;
            stripped += 1;
        }
    }
    info!(stripped, "velocity removed from every fourth entity");

    let value_total: i64 = world
        .query::<(&Value,)>()
        .map(|(_, (v,))| i64::from(v.0))
        .sum();
    info!(value_total, "summed values");

    Ok(world.stats())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(%panic_info, "bubl-demo panicked");
        default_hook(panic_info);
    }));

    let config = DemoConfig::from_env().context("reading demo configuration")?;
    info!(config = %serde_json::to_string(&config)?, "starting demo");

    walkthrough().context("walkthrough failed")?;

    let stats = simulate(&config).context("simulation failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("serializing world stats")?
    );
    Ok(())
}
