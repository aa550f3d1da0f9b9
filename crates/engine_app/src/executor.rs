//! The executor: runs systems tick by tick.
//!
//! Each tick visits the scheduled systems in order. For every system:
//!
//! 1. Run the before-hooks of its queries.
//! 2. Run its body with a fresh command buffer.
//! 3. Run the after-hooks of its queries. An error from the body takes
//!    precedence over an error from a hook.
//! 4. Apply the buffer, firing the notifications the next system's queries
//!    consume.
//!
//! Run-once systems take part in the first tick only.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info, warn};

use engine_component::{EcsError, Result, World};
use engine_query::QuerySet;
use engine_system::{System, SystemContext, SystemId};

use crate::tick::{Cadence, Pace, TickConfig};

/// A constructed system and the queries it declared.
pub(crate) struct ScheduledSystem {
    pub(crate) id: SystemId,
    pub(crate) run_once: bool,
    pub(crate) system: Box<dyn System>,
    pub(crate) queries: QuerySet,
}

/// Runs the systems of a finalized engine.
pub struct Executor {
    world: World,
    systems: Vec<ScheduledSystem>,
    tick_id: u64,
    startup_done: bool,
    last_tick: Option<Instant>,
}

impl Executor {
    pub(crate) fn new(world: World, systems: Vec<ScheduledSystem>) -> Self {
        Self {
            world,
            systems,
            tick_id: 0,
            startup_done: false,
            last_tick: None,
        }
    }

    /// Returns the number of completed ticks.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the world, for inspection between ticks.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Returns the names of the systems that will run on the next tick, in
    /// order.
    #[must_use]
    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|slot| slot.id.name()).collect()
    }

    /// Run exactly one tick.
    ///
    /// # Errors
    ///
    /// Stops at the first failing system: [`EcsError::SystemFailed`] for an
    /// error returned by a system body, or the error raised while applying
    /// its commands.
    pub fn update(&mut self) -> Result<()> {
        let tick_id = self.tick_id + 1;
        let now = Instant::now();
        let dt = self
            .last_tick
            .map_or(0.0, |last| now.duration_since(last).as_secs_f64());
        self.last_tick = Some(now);

        debug!(tick_id, dt, systems = self.systems.len(), "tick start");
        for slot in &mut self.systems {
            run_turn(&mut self.world, slot, tick_id, dt)?;
        }
        self.tick_id = tick_id;

        if !self.startup_done {
            self.startup_done = true;
            let before = self.systems.len();
            self.systems.retain(|slot| !slot.run_once);
            let dropped = before - self.systems.len();
            if dropped > 0 {
                debug!(dropped, "run-once systems retired");
            }
        }
        Ok(())
    }

    /// Run the fixed-rate loop until `config.max_ticks` ticks have run, or
    /// forever if it is 0. Blocks the calling thread between ticks.
    ///
    /// # Errors
    ///
    /// Fails on an invalid tick rate or the first failing tick.
    pub fn run(&mut self, config: &TickConfig) -> Result<()> {
        let mut cadence = self.begin(config)?;
        let mut completed = 0;
        while let Some(wait) = self.step(config, &mut cadence, &mut completed)? {
            std::thread::sleep(wait);
        }
        Ok(())
    }

    /// Run the fixed-rate loop indefinitely, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Only returns on an invalid tick rate or a failing tick.
    pub fn start(&mut self, ticks_per_second: f64) -> Result<()> {
        self.run(&TickConfig::unbounded(ticks_per_second))
    }

    /// Async version of [`Executor::run`]; waits on the tokio timer between
    /// ticks.
    ///
    /// # Errors
    ///
    /// Fails on an invalid tick rate or the first failing tick.
    pub async fn run_async(&mut self, config: &TickConfig) -> Result<()> {
        let mut cadence = self.begin(config)?;
        let mut completed = 0;
        while let Some(wait) = self.step(config, &mut cadence, &mut completed)? {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// Async version of [`Executor::start`].
    ///
    /// # Errors
    ///
    /// Only returns on an invalid tick rate or a failing tick.
    pub async fn start_async(&mut self, ticks_per_second: f64) -> Result<()> {
        self.run_async(&TickConfig::unbounded(ticks_per_second)).await
    }

    fn begin(&self, config: &TickConfig) -> Result<Cadence> {
        let period = config.period()?;
        info!(
            tick_rate = config.tick_rate,
            max_ticks = config.max_ticks,
            "starting tick loop"
        );
        Ok(Cadence::new(period, Instant::now()))
    }

    /// Run one tick of a loop. Returns how long to wait before the next one,
    /// or `None` when the loop is done.
    fn step(
        &mut self,
        config: &TickConfig,
        cadence: &mut Cadence,
        completed: &mut u64,
    ) -> Result<Option<Duration>> {
        self.update()?;
        *completed += 1;
        if config.is_done(*completed) {
            info!(ticks = *completed, "tick loop complete");
            return Ok(None);
        }

        match cadence.pace(Instant::now()) {
            Pace::Sleep(wait) => Ok(Some(wait)),
            Pace::Overrun(behind) => {
                warn!(
                    tick_id = self.tick_id,
                    behind_ms = behind.as_millis() as u64,
                    budget_ms = cadence.period().as_millis() as u64,
                    "tick exceeded time budget"
                );
                Ok(Some(Duration::ZERO))
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("tick_id", &self.tick_id)
            .field("systems", &self.system_names())
            .field("world", &self.world)
            .finish()
    }
}

fn run_turn(world: &mut World, slot: &mut ScheduledSystem, tick_id: u64, dt: f64) -> Result<()> {
    let name = slot.id.name();
    let span = debug_span!("system", system = name, tick_id);
    let _entered = span.enter();

    slot.queries.before_system(world);
    let ctx = SystemContext::new(world, tick_id, dt);
    let outcome = slot.system.run(&ctx);
    let commands = ctx.into_commands();
    let hooks = slot.queries.after_system(world);

    outcome.map_err(|source| EcsError::SystemFailed {
        system: name.to_string(),
        source,
    })?;
    hooks?;
    commands.apply(world)
}
