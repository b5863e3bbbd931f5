//! Error taxonomy (`spec.md` §7).
//!
//! Component-scoped failures (`ArithmeticDegenerate`) are recovered locally
//! by the grid pipeline and never surface as an `Err` here — they are
//! logged and folded into the snapshot's `active_failure_ids`. Everything
//! else in this enum is returned to the caller.

use thiserror::Error;

/// The lifecycle status a [`NotRunning`](VoltEdgeError::NotRunning) or
/// [`AlreadyRunning`](VoltEdgeError::AlreadyRunning) error was rejected in.
pub use crate::orchestrator::SimulationStatus;

/// All error kinds the VoltEdge core can return to a caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VoltEdgeError {
    /// Configuration failed validation at `create_simulation`; the
    /// simulation was never created. Carries every violation found, not
    /// just the first.
    #[error("configuration invalid: {0:?}")]
    ConfigurationInvalid(Vec<ConfigViolation>),

    /// A fault, setpoint change, or repair targeted a component id that
    /// does not exist in the simulation.
    #[error("unknown component id {0}")]
    UnknownComponent(u32),

    /// A fault kind was applied to a component type it does not support
    /// (e.g. `substation_failure` targeting a plant).
    #[error("fault kind {kind} is not supported for this component type")]
    UnsupportedFault {
        /// Name of the offending fault kind.
        kind: String,
    },

    /// The per-tick event queue is full; the producer should retry next
    /// tick.
    #[error("event batch is full")]
    BatchFull,

    /// `create_simulation` was rejected because the orchestrator is at its
    /// configured capacity.
    #[error("maximum concurrent simulations reached")]
    MaxSimulationsReached,

    /// No simulation exists with the given id.
    #[error("simulation {0} not found")]
    NotFound(u64),

    /// A lifecycle transition requires the simulation to be running, but
    /// it is not.
    #[error("simulation is not running (current status: {current:?})")]
    NotRunning {
        /// The simulation's actual status at the time of the request.
        current: SimulationStatus,
    },

    /// `start` was called on a simulation that is already running.
    #[error("simulation is already running")]
    AlreadyRunning,

    /// The simulation exceeded its configured wall-clock budget and
    /// transitioned to `error`.
    #[error("simulation timed out")]
    TimedOut,

    /// Allocating buffers for a tick's snapshot failed; the simulation
    /// transitions to `error` and the last valid snapshot is preserved.
    #[error("resource exhausted while assembling tick")]
    ResourceExhausted,
}

/// One field-level configuration violation, collected by
/// [`crate::config::ScenarioConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Dotted field path, e.g. `"power_plants[2].capacity_mw"`.
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigViolation {
    /// Creates a violation for `field` with a human-readable `message`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoltEdgeError>;
