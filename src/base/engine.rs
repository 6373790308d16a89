use std::fmt;

use log::{debug, trace};

use crate::timeq::Cycle;

/// A unit of the simulation that advances once per cycle.
///
/// `tick` must never block: it either does some work and returns `true`, or finds nothing it can
/// do this cycle and returns `false`, in which case it will simply be called again next cycle.
pub trait TickingComponent {
    fn name(&self) -> &str;

    fn tick(&mut self, now: Cycle) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Components kept reporting progress past the cycle budget.
    Timeout { start: Cycle, now: Cycle },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Timeout { start, now } => write!(
                f,
                "simulation still busy after {} cycles (started at {start}, now {now})",
                now - start
            ),
        }
    }
}

impl std::error::Error for EngineError {}

/// Serial engine owning the authoritative notion of time.
#[derive(Debug, Default)]
pub struct Engine {
    now: Cycle,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Ticks every component once, in order, and advances time by one cycle.
    pub fn step(&mut self, components: &mut [&mut dyn TickingComponent]) -> bool {
        let now = self.now;
        let mut made_progress = false;
        for comp in components.iter_mut() {
            let progress = comp.tick(now);
            if progress {
                trace!("[{now}] {} made progress", comp.name());
            }
            made_progress |= progress;
        }
        self.now += 1;
        made_progress
    }

    /// Runs until a full cycle passes without progress from any component.
    /// Returns the cycle at which the system went idle.
    pub fn run(
        &mut self,
        components: &mut [&mut dyn TickingComponent],
        max_cycles: Cycle,
    ) -> Result<Cycle, EngineError> {
        let start = self.now;
        loop {
            if !self.step(components) {
                debug!("engine idle at cycle {}", self.now);
                return Ok(self.now);
            }
            if self.now - start >= max_cycles {
                return Err(EngineError::Timeout {
                    start,
                    now: self.now,
                });
            }
        }
    }
}
