//! Multi-simulation lifecycle and concurrency (`spec.md` §4.8
//! "Orchestrator", §5 "Concurrency & Resource Model").
//!
//! No async runtime: each running simulation owns one worker thread that
//! ticks on a fixed cadence, per §9 Design Notes "Coroutine/async patterns".
//! The simulation registry is a read-mostly [`RwLock`] so lookups never
//! contend with each other; each simulation's own mutable state lives behind
//! its own [`Mutex`] so one simulation's tick never blocks another's.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::clock::{unix_now_secs, Clock, DeterministicClock};
use crate::config::ScenarioConfig;
use crate::error::VoltEdgeError;
use crate::grid::{EventPayload, FaultKind, GridModel, Snapshot};
use crate::metrics::MetricsRing;

/// A simulation's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Created,
    Running,
    Paused,
    Completed,
    Error,
}

struct RunningWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The part of a simulation's lifecycle metadata a background worker thread
/// needs to mutate directly (status, error, completion time), split out from
/// [`Simulation`] so the worker thread can update it without needing the
/// registry's per-simulation lock, which the owning thread may be holding
/// for an unrelated call at the same instant.
struct Lifecycle {
    status: SimulationStatus,
    error_description: Option<String>,
    completed_at_unix_s: Option<u64>,
}

/// Wall-clock budget check for `spec.md` §5: a simulation with
/// `max_wall_clock_s` set is forced into `error` once that many seconds have
/// elapsed since it started running. Checked at tick boundaries rather than
/// via a timer so expiry stays tied to the tick pipeline instead of firing
/// mid-tick.
fn wall_clock_budget_exceeded(started_at_unix_s: Option<u64>, max_wall_clock_s: Option<u64>) -> bool {
    match (started_at_unix_s, max_wall_clock_s) {
        (Some(started), Some(budget)) => unix_now_secs().saturating_sub(started) >= budget,
        _ => false,
    }
}

fn mark_timed_out(lifecycle: &Mutex<Lifecycle>) {
    let mut lifecycle = lifecycle.lock().expect("lifecycle mutex poisoned");
    lifecycle.status = SimulationStatus::Error;
    lifecycle.error_description = Some("wall-clock budget exceeded".to_string());
    lifecycle.completed_at_unix_s = Some(unix_now_secs());
}

/// One simulation's full state: its grid, its metrics buffer, and (while
/// running) the worker thread advancing it.
pub struct Simulation {
    id: u64,
    created_at_unix_s: u64,
    started_at_unix_s: Option<u64>,
    max_wall_clock_s: Option<u64>,
    tick_rate: Duration,
    tick_number: u64,
    grid: Arc<Mutex<GridModel>>,
    metrics: Arc<MetricsRing>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    worker: Option<RunningWorker>,
}

impl Simulation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> SimulationStatus {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").status
    }

    pub fn tick_number(&self) -> u64 {
        self.tick_number
    }

    pub fn created_at_unix_s(&self) -> u64 {
        self.created_at_unix_s
    }

    pub fn started_at_unix_s(&self) -> Option<u64> {
        self.started_at_unix_s
    }

    pub fn completed_at_unix_s(&self) -> Option<u64> {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").completed_at_unix_s
    }

    pub fn error_description(&self) -> Option<String> {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").error_description.clone()
    }

    pub fn metrics(&self) -> &MetricsRing {
        &self.metrics
    }

    fn set_status(&self, status: SimulationStatus) {
        self.lifecycle.lock().expect("lifecycle mutex poisoned").status = status;
    }

    fn mark_error(&self, description: impl Into<String>) {
        let mut lifecycle = self.lifecycle.lock().expect("lifecycle mutex poisoned");
        lifecycle.status = SimulationStatus::Error;
        lifecycle.error_description = Some(description.into());
        lifecycle.completed_at_unix_s = Some(unix_now_secs());
    }

    fn budget_exceeded(&self) -> bool {
        wall_clock_budget_exceeded(self.started_at_unix_s, self.max_wall_clock_s)
    }

    /// Advances the simulation by exactly one tick, synchronously. Used
    /// directly by deterministic callers (tests, `run_until`); the
    /// background worker spawned by [`Orchestrator::start`] calls the same
    /// path on its own cadence.
    fn tick_once(&mut self, clock: &dyn Clock) -> Snapshot {
        let mut grid = self.grid.lock().expect("grid mutex poisoned");
        let snapshot = grid.tick(self.tick_number, self.tick_rate.as_secs_f64(), clock);
        self.tick_number += 1;
        self.metrics.push(snapshot.clone());
        snapshot
    }
}

/// Owns every simulation created in this process and enforces the
/// concurrency bound from `spec.md` §5.
pub struct Orchestrator {
    simulations: RwLock<BTreeMap<u64, Mutex<Simulation>>>,
    max_simulations: usize,
    next_id: AtomicU64,
    retention_window_s: AtomicU64,
}

impl Orchestrator {
    pub fn new(max_simulations: usize) -> Self {
        Self {
            simulations: RwLock::new(BTreeMap::new()),
            max_simulations,
            next_id: AtomicU64::new(1),
            retention_window_s: AtomicU64::new(3600),
        }
    }

    /// Validates `config` and, if it passes, creates a new simulation in the
    /// `created` state. Returns its id.
    pub fn create_simulation(&self, config: ScenarioConfig) -> Result<u64, VoltEdgeError> {
        let violations = config.validate();
        if !violations.is_empty() {
            return Err(VoltEdgeError::ConfigurationInvalid(violations));
        }

        let mut simulations = self.simulations.write().expect("registry lock poisoned");
        if simulations.len() >= self.max_simulations {
            return Err(VoltEdgeError::MaxSimulationsReached);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tick_rate = Duration::from_millis(config.tick_rate_ms);
        let max_wall_clock_s = config.max_wall_clock_s;
        self.retention_window_s
            .store(config.retention_window_s, Ordering::Relaxed);
        let grid = GridModel::new(id, &config)?;

        simulations.insert(
            id,
            Mutex::new(Simulation {
                id,
                created_at_unix_s: unix_now_secs(),
                started_at_unix_s: None,
                max_wall_clock_s,
                tick_rate,
                tick_number: 0,
                grid: Arc::new(Mutex::new(grid)),
                metrics: Arc::new(MetricsRing::default()),
                lifecycle: Arc::new(Mutex::new(Lifecycle {
                    status: SimulationStatus::Created,
                    error_description: None,
                    completed_at_unix_s: None,
                })),
                worker: None,
            }),
        );
        Ok(id)
    }

    /// Removes a simulation, stopping its worker thread first if running.
    pub fn delete_simulation(&self, id: u64) -> Result<(), VoltEdgeError> {
        let removed = {
            let mut simulations = self.simulations.write().expect("registry lock poisoned");
            simulations.remove(&id)
        };
        let sim = removed.ok_or(VoltEdgeError::NotFound(id))?.into_inner().expect("simulation mutex poisoned");
        if let Some(worker) = sim.worker {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
        }
        Ok(())
    }

    /// Starts (or resumes) the background worker for `id`.
    pub fn start(&self, id: u64) -> Result<(), VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let mut sim = sim_lock.lock().expect("simulation mutex poisoned");

        if sim.status() == SimulationStatus::Running {
            return Err(VoltEdgeError::AlreadyRunning);
        }

        sim.set_status(SimulationStatus::Running);
        sim.started_at_unix_s = Some(unix_now_secs());

        let stop = Arc::new(AtomicBool::new(false));
        let grid = Arc::clone(&sim.grid);
        let metrics = Arc::clone(&sim.metrics);
        let lifecycle = Arc::clone(&sim.lifecycle);
        let tick_rate = sim.tick_rate;
        let simulation_id = sim.id;
        let started_at_unix_s = sim.started_at_unix_s;
        let max_wall_clock_s = sim.max_wall_clock_s;
        let worker_stop = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let clock = DeterministicClock::from_tick_rate(tick_rate);
            let mut tick_number = 0u64;
            while !worker_stop.load(Ordering::Relaxed) {
                if wall_clock_budget_exceeded(started_at_unix_s, max_wall_clock_s) {
                    mark_timed_out(&lifecycle);
                    tracing::warn!(simulation_id, "worker thread stopped: wall-clock budget exceeded");
                    return;
                }
                {
                    let mut grid = grid.lock().expect("grid mutex poisoned");
                    let snapshot = grid.tick(tick_number, tick_rate.as_secs_f64(), &clock);
                    metrics.push(snapshot);
                }
                tick_number += 1;
                thread::sleep(tick_rate);
            }
            tracing::info!(simulation_id, "worker thread stopped");
        });

        sim.worker = Some(RunningWorker { stop, handle });
        Ok(())
    }

    /// Pauses a running simulation's worker thread without discarding its
    /// state.
    pub fn pause(&self, id: u64) -> Result<(), VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let mut sim = sim_lock.lock().expect("simulation mutex poisoned");
        let current = sim.status();
        if current != SimulationStatus::Running {
            return Err(VoltEdgeError::NotRunning { current });
        }
        if let Some(worker) = sim.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
        }
        if sim.status() != SimulationStatus::Error {
            sim.set_status(SimulationStatus::Paused);
        }
        Ok(())
    }

    /// Stops a simulation permanently, marking it `completed`.
    pub fn stop(&self, id: u64) -> Result<(), VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let mut sim = sim_lock.lock().expect("simulation mutex poisoned");
        if let Some(worker) = sim.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
        }
        if sim.status() != SimulationStatus::Error {
            sim.set_status(SimulationStatus::Completed);
            let mut lifecycle = sim.lifecycle.lock().expect("lifecycle mutex poisoned");
            lifecycle.completed_at_unix_s = Some(unix_now_secs());
        }
        Ok(())
    }

    /// Marks a simulation as failed, recording `description` for later
    /// inspection. Used internally and by callers that detect an
    /// unrecoverable condition outside the tick pipeline.
    pub fn mark_error(&self, id: u64, description: impl Into<String>) -> Result<(), VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let mut sim = sim_lock.lock().expect("simulation mutex poisoned");
        if let Some(worker) = sim.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
        }
        sim.mark_error(description);
        Ok(())
    }

    /// Returns `id`'s current status, or `NotFound`.
    pub fn status(&self, id: u64) -> Result<SimulationStatus, VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        Ok(sim_lock.lock().expect("simulation mutex poisoned").status())
    }

    /// Enqueues a fault for the next tick. Valid in any lifecycle state; the
    /// event is applied whenever the simulation next ticks.
    pub fn inject_fault(
        &self,
        id: u64,
        event_id: u64,
        component_id: u32,
        kind: FaultKind,
    ) -> Result<(), VoltEdgeError> {
        self.enqueue(id, event_id, EventPayload::Fault { component_id, kind })
    }

    /// Enqueues a repair for the next tick.
    pub fn repair(&self, id: u64, event_id: u64, component_id: u32) -> Result<(), VoltEdgeError> {
        self.enqueue(id, event_id, EventPayload::Repair { component_id })
    }

    /// Enqueues an operator setpoint change for the next tick.
    pub fn set_point(
        &self,
        id: u64,
        event_id: u64,
        plant_id: u32,
        target_output_mw: f64,
    ) -> Result<(), VoltEdgeError> {
        self.enqueue(
            id,
            event_id,
            EventPayload::SetPoint { plant_id, target_output_mw },
        )
    }

    fn enqueue(&self, id: u64, event_id: u64, payload: EventPayload) -> Result<(), VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let sim = sim_lock.lock().expect("simulation mutex poisoned");
        let mut grid = sim.grid.lock().expect("grid mutex poisoned");
        grid.events.push(crate::grid::Event {
            event_id,
            timestamp: Duration::ZERO,
            payload,
        })
    }

    /// Advances a `created` or `paused` simulation by exactly one tick,
    /// synchronously, using a deterministic clock keyed off its tick rate.
    /// Returns `NotRunning` only if the simulation has a live worker thread
    /// (manual and background ticking are mutually exclusive). Returns
    /// `TimedOut` (without ticking, and marking the simulation `error`)
    /// once the simulation's wall-clock budget, if any, has elapsed.
    pub fn tick(&self, id: u64) -> Result<Snapshot, VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let mut sim = sim_lock.lock().expect("simulation mutex poisoned");
        let current = sim.status();
        if current == SimulationStatus::Running {
            return Err(VoltEdgeError::NotRunning { current });
        }
        if sim.budget_exceeded() {
            sim.mark_error("wall-clock budget exceeded");
            return Err(VoltEdgeError::TimedOut);
        }
        let tick_rate = sim.tick_rate;
        let clock = DeterministicClock::from_tick_rate(tick_rate);
        Ok(sim.tick_once(&clock))
    }

    /// Repeatedly ticks `id` until its tick counter reaches `target_tick`.
    pub fn run_until(&self, id: u64, target_tick: u64) -> Result<Vec<Snapshot>, VoltEdgeError> {
        let mut snapshots = Vec::new();
        loop {
            let current = {
                let simulations = self.simulations.read().expect("registry lock poisoned");
                let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
                sim_lock.lock().expect("simulation mutex poisoned").tick_number
            };
            if current >= target_tick {
                break;
            }
            snapshots.push(self.tick(id)?);
        }
        Ok(snapshots)
    }

    /// Removes every `completed`/`error` simulation whose completion
    /// timestamp is older than the configured retention window.
    pub fn sweep_retention(&self) {
        let retention = self.retention_window_s.load(Ordering::Relaxed);
        let now = unix_now_secs();
        let mut simulations = self.simulations.write().expect("registry lock poisoned");
        simulations.retain(|_, sim_lock| {
            let sim = sim_lock.lock().expect("simulation mutex poisoned");
            let terminal = matches!(sim.status(), SimulationStatus::Completed | SimulationStatus::Error);
            match sim.completed_at_unix_s() {
                Some(completed) if terminal => now.saturating_sub(completed) < retention,
                _ => true,
            }
        });
    }

    pub fn simulation_count(&self) -> usize {
        self.simulations.read().expect("registry lock poisoned").len()
    }

    /// Drains every snapshot buffered for `id` since the last call.
    pub fn drain_metrics(&self, id: u64) -> Result<Vec<Snapshot>, VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let sim = sim_lock.lock().expect("simulation mutex poisoned");
        Ok(sim.metrics.drain())
    }

    /// Returns a lifecycle summary for `id`.
    pub fn info(&self, id: u64) -> Result<SimulationInfo, VoltEdgeError> {
        let simulations = self.simulations.read().expect("registry lock poisoned");
        let sim_lock = simulations.get(&id).ok_or(VoltEdgeError::NotFound(id))?;
        let sim = sim_lock.lock().expect("simulation mutex poisoned");
        Ok(SimulationInfo {
            id: sim.id(),
            status: sim.status(),
            tick_number: sim.tick_number(),
            created_at_unix_s: sim.created_at_unix_s(),
            started_at_unix_s: sim.started_at_unix_s(),
            completed_at_unix_s: sim.completed_at_unix_s(),
            error_description: sim.error_description(),
        })
    }
}

/// A snapshot of one simulation's lifecycle metadata, independent of its
/// grid state.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationInfo {
    pub id: u64,
    pub status: SimulationStatus,
    pub tick_number: u64,
    pub created_at_unix_s: u64,
    pub started_at_unix_s: Option<u64>,
    pub completed_at_unix_s: Option<u64>,
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineConfig, PlantConfig, ScenarioConfig};
    use crate::grid::{LoadProfile, PlantKind};

    fn minimal_config() -> ScenarioConfig {
        ScenarioConfig {
            tick_rate_ms: 10,
            max_simulations: 4,
            base_frequency: 50.0,
            base_voltage: 230.0,
            power_plants: vec![PlantConfig {
                plant_id: 1,
                kind: PlantKind::Gas,
                max_capacity_mw: 200.0,
                efficiency: 0.4,
                node_id: 0,
                initially_online: true,
                initial_output_mw: 100.0,
            }],
            transmission_lines: vec![LineConfig {
                line_id: 1,
                from_node: 0,
                to_node: 1,
                capacity_mw: 150.0,
                length_km: 20.0,
                resistance_per_km: 0.05,
                reactance_per_km: 0.1,
                initially_operational: true,
            }],
            load_profile: LoadProfile {
                base_load_mw: 90.0,
                daily_variation: 0.1,
                random_variation: 0.02,
            },
            retention_window_s: 3600,
            max_wall_clock_s: None,
        }
    }

    #[test]
    fn create_rejects_invalid_config() {
        let orchestrator = Orchestrator::new(4);
        let mut config = minimal_config();
        config.base_voltage = -1.0;
        assert!(matches!(
            orchestrator.create_simulation(config),
            Err(VoltEdgeError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn create_enforces_max_simulations() {
        let orchestrator = Orchestrator::new(1);
        orchestrator.create_simulation(minimal_config()).unwrap();
        assert_eq!(
            orchestrator.create_simulation(minimal_config()),
            Err(VoltEdgeError::MaxSimulationsReached)
        );
    }

    #[test]
    fn manual_tick_advances_and_buffers_metrics() {
        let orchestrator = Orchestrator::new(4);
        let id = orchestrator.create_simulation(minimal_config()).unwrap();
        orchestrator.tick(id).unwrap();
        orchestrator.tick(id).unwrap();
        let info = orchestrator.info(id).unwrap();
        assert_eq!(info.tick_number, 2);
        assert_eq!(orchestrator.drain_metrics(id).unwrap().len(), 2);
    }

    #[test]
    fn run_until_reaches_target_tick() {
        let orchestrator = Orchestrator::new(4);
        let id = orchestrator.create_simulation(minimal_config()).unwrap();
        let snapshots = orchestrator.run_until(id, 5).unwrap();
        assert_eq!(snapshots.len(), 5);
        assert_eq!(orchestrator.info(id).unwrap().tick_number, 5);
    }

    #[test]
    fn unknown_simulation_is_not_found() {
        let orchestrator = Orchestrator::new(4);
        assert_eq!(orchestrator.tick(999), Err(VoltEdgeError::NotFound(999)));
    }

    #[test]
    fn start_then_start_again_is_rejected() {
        let orchestrator = Orchestrator::new(4);
        let id = orchestrator.create_simulation(minimal_config()).unwrap();
        orchestrator.start(id).unwrap();
        assert_eq!(orchestrator.start(id), Err(VoltEdgeError::AlreadyRunning));
        orchestrator.stop(id).unwrap();
    }

    #[test]
    fn delete_stops_running_worker() {
        let orchestrator = Orchestrator::new(4);
        let id = orchestrator.create_simulation(minimal_config()).unwrap();
        orchestrator.start(id).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        orchestrator.delete_simulation(id).unwrap();
        assert_eq!(orchestrator.simulation_count(), 0);
    }

    #[test]
    fn wall_clock_budget_check_triggers_only_once_elapsed() {
        let now = unix_now_secs();
        assert!(!wall_clock_budget_exceeded(Some(now), Some(60)));
        assert!(wall_clock_budget_exceeded(Some(now.saturating_sub(60)), Some(60)));
        assert!(!wall_clock_budget_exceeded(Some(now), None));
        assert!(!wall_clock_budget_exceeded(None, Some(60)));
    }

    #[test]
    fn manual_tick_past_budget_times_out_and_marks_error() {
        let orchestrator = Orchestrator::new(4);
        let mut config = minimal_config();
        config.max_wall_clock_s = Some(1);
        let id = orchestrator.create_simulation(config).unwrap();
        {
            let simulations = orchestrator.simulations.read().unwrap();
            let mut sim = simulations.get(&id).unwrap().lock().unwrap();
            sim.started_at_unix_s = Some(unix_now_secs().saturating_sub(5));
        }
        assert_eq!(orchestrator.tick(id), Err(VoltEdgeError::TimedOut));
        assert_eq!(orchestrator.status(id).unwrap(), SimulationStatus::Error);
        assert!(orchestrator.info(id).unwrap().error_description.is_some());
    }
}
