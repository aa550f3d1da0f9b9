//! # engine_app demo
//!
//! A small world of people walking around. It shows a run-once setup
//! system, `run_after` ordering, writable static queries, a shared resource,
//! and a reactive query greeting every name that is added or changed.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use engine_app::prelude::*;

#[derive(Parser)]
#[command(name = "engine_app", about = "Fixed-tick ECS demo")]
struct Args {
    /// Ticks per second
    #[arg(short, long, default_value_t = 1.0)]
    tick_rate: f64,

    /// Number of ticks to run; 0 runs forever
    #[arg(short = 'n', long, default_value_t = 0)]
    ticks: u64,

    /// Minimum log level (RUST_LOG directives still apply)
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,

    /// JSON file with a tick configuration; overrides --tick-rate and --ticks
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[derive(Debug)]
struct Person {
    speed: f64,
}
impl Component for Person {}

#[derive(Debug)]
struct Name(String);
impl Component for Name {}

#[derive(Debug, Default)]
struct Clock {
    elapsed: f64,
    since_rename: f64,
}
impl Resource for Clock {}

struct StartupSystem;

impl System for StartupSystem {
    fn config() -> SystemConfig {
        SystemConfig::new().run_once()
    }

    fn build(_: &mut SystemInit<'_>) -> Result<Self> {
        Ok(Self)
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        for (index, name) in ["Ada", "Grace", "Linus"].into_iter().enumerate() {
            let entity = ctx.spawn((
                Position { x: 0.0, y: index as f64 },
                Person {
                    speed: 1.0 + index as f64,
                },
                Name(name.to_string()),
            ))?;
            info!(%entity, name, "spawned person");
        }
        // A walker nobody bothered to name.
        ctx.spawn((Position { x: 0.0, y: -1.0 }, Person { speed: 0.5 }))?;
        Ok(())
    }
}

struct LogicSystem {
    clock: ResourceQuery<Clock>,
}

impl System for LogicSystem {
    fn build(init: &mut SystemInit<'_>) -> Result<Self> {
        let clock = init.resource::<Clock>().writable().build()?;
        Ok(Self { clock })
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        let mut clock = self.clock.get_mut(ctx)?;
        clock.elapsed += ctx.dt();
        clock.since_rename += ctx.dt();
        Ok(())
    }
}

struct MovePeopleSystem {
    people: EntityQuery,
}

impl System for MovePeopleSystem {
    fn config() -> SystemConfig {
        SystemConfig::new().run_after::<LogicSystem>()
    }

    fn build(init: &mut SystemInit<'_>) -> Result<Self> {
        let people = init
            .query()
            .select::<Position>()
            .writable()
            .select::<Person>()
            .select::<Name>()
            .optional()
            .build()?;
        Ok(Self { people })
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        if self.people.is_empty()? {
            warn!("nobody to move");
            return Ok(());
        }
        for row in self.people.iter(ctx)? {
            let speed = row.get::<Person>()?.speed;
            let mut position = row.get_mut::<Position>()?;
            position.x += speed * ctx.dt();
            let name = row
                .try_get::<Name>()?
                .map_or_else(|| "<anonymous>".to_string(), |name| name.0.clone());
            info!(
                entity = %row.entity(),
                name,
                x = position.x,
                y = position.y,
                "moved"
            );
        }
        Ok(())
    }
}

struct RenameSystem {
    clock: ResourceQuery<Clock>,
    names: EntityQuery,
}

impl RenameSystem {
    const INTERVAL_SECS: f64 = 5.0;
}

impl System for RenameSystem {
    fn config() -> SystemConfig {
        SystemConfig::new().run_after::<MovePeopleSystem>()
    }

    fn build(init: &mut SystemInit<'_>) -> Result<Self> {
        let clock = init.resource::<Clock>().writable().build()?;
        let names = init.query().select::<Name>().writable().build()?;
        Ok(Self { clock, names })
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        let mut clock = self.clock.get_mut(ctx)?;
        if clock.since_rename < Self::INTERVAL_SECS {
            return Ok(());
        }
        clock.since_rename = 0.0;

        for row in self.names.iter(ctx)? {
            row.get_mut::<Name>()?.0.push_str(" +1");
        }
        Ok(())
    }
}

struct HelloSystem {
    greeted: EntityQuery,
}

impl System for HelloSystem {
    fn config() -> SystemConfig {
        SystemConfig::new().run_after::<RenameSystem>()
    }

    fn build(init: &mut SystemInit<'_>) -> Result<Self> {
        let greeted = init
            .query()
            .select_id()
            .select::<Name>()
            .added()
            .changed()
            .build()?;
        Ok(Self { greeted })
    }

    fn run(&mut self, ctx: &SystemContext<'_>) -> anyhow::Result<()> {
        for row in self.greeted.iter(ctx)? {
            let name = row.get::<Name>()?;
            info!(tick_id = ctx.tick_id(), entity = %row.entity(), "hello, {}", name.0);
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> anyhow::Result<TickConfig> {
    let Some(path) = &args.config else {
        return Ok(TickConfig {
            tick_rate: args.tick_rate,
            max_ticks: args.ticks,
        });
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid tick config in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut executor = Engine::new()
        .component::<Position>()?
        .component::<Person>()?
        .component::<Name>()?
        .resource::<Clock>()?
        .system::<HelloSystem>()?
        .system::<RenameSystem>()?
        .system::<MovePeopleSystem>()?
        .system::<LogicSystem>()?
        .system::<StartupSystem>()?
        .log_level(args.log_level)
        .finalize()?;

    info!(systems = ?executor.system_names(), "engine ready");
    executor.run_async(&config).await?;

    let clock = executor.world().resource::<Clock>()?;
    info!(
        ticks = executor.tick_id(),
        elapsed = clock.elapsed,
        "engine stopped"
    );
    Ok(())
}
