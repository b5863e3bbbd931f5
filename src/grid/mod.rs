//! The grid domain: plants, lines, load, faults, events, and the model that
//! ties them together into a per-tick pipeline.

pub mod event;
pub mod fault;
pub mod line;
pub mod load;
pub mod model;
pub mod plant;

pub use event::{Event, EventBatch, EventPayload};
pub use fault::FaultKind;
pub use line::{Line, LineState};
pub use load::LoadProfile;
pub use model::{Alert, GridModel, Snapshot};
pub use plant::{OperatingState, Plant, PlantKind};
