//! The grid itself: owns every plant and line and drives the per-tick
//! pipeline (`spec.md` §4.4 "GridModel").

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::ScenarioConfig;
use crate::error::VoltEdgeError;
use crate::grid::event::{EventBatch, EventPayload};
use crate::grid::fault;
use crate::grid::line::Line;
use crate::grid::load::LoadProfile;
use crate::grid::plant::{weather_target_mw, Plant, PlantKind};

/// Frequency damping factor in the §4.4 step 7 update formula.
const FREQUENCY_DAMPING: f64 = 0.1;
/// Deviation from base frequency beyond which a warning is raised (§4.4 step 9).
const FREQUENCY_WARNING_DEVIATION_HZ: f64 = 2.0;
/// Deviation from base frequency beyond which renewables are shed (§4.4 step 9).
const CASCADE_DEVIATION_HZ: f64 = 3.0;
/// How strongly a node's net generation/demand imbalance, as a fraction of
/// total installed capacity, perturbs that node's sending-end voltage in
/// §4.4 step 6. Matches the sensitivity already used by the per-node
/// voltage field formula in step 8.
const NODE_VOLTAGE_SENSITIVITY: f64 = 0.05;

/// An out-of-band condition raised during a tick, alongside (not instead of)
/// the component-level state transitions it describes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Dispatch could not meet demand with available online capacity.
    UnmetDemand { shortfall_mw: f64 },
    /// Frequency deviation exceeded the warning threshold but not the
    /// cascade threshold.
    FrequencyWarning { deviation_hz: f64 },
}

/// The full state of one simulated grid, plus the pieces needed to advance
/// it deterministically by one tick.
pub struct GridModel {
    pub simulation_id: u64,
    pub plants: BTreeMap<u32, Plant>,
    pub lines: BTreeMap<u32, Line>,
    pub load_profile: LoadProfile,
    pub base_frequency_hz: f64,
    pub base_voltage_kv: f64,
    pub grid_frequency_hz: f64,
    pub events: EventBatch,
}

/// The externally visible, serializable result of one tick. Field names and
/// presence are part of the public contract (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub simulation_id: u64,
    pub tick_number: u64,
    pub timestamp: Duration,
    pub total_generation_mw: f64,
    pub total_consumption_mw: f64,
    pub grid_frequency_hz: f64,
    pub grid_voltage_kv: f64,
    pub efficiency_percentage: f64,
    pub fault_count: u32,
    pub active_failure_ids: Vec<u32>,
    pub alerts: Vec<Alert>,
}

impl GridModel {
    pub fn new(simulation_id: u64, config: &ScenarioConfig) -> Result<Self, VoltEdgeError> {
        let mut plants = BTreeMap::new();
        for p in &config.power_plants {
            let plant = Plant::new(
                p.plant_id,
                p.kind,
                p.max_capacity_mw,
                p.efficiency,
                p.initially_online,
                p.initial_output_mw,
                p.node_id,
            )
            .map_err(|v| VoltEdgeError::ConfigurationInvalid(vec![v]))?;
            plants.insert(plant.plant_id, plant);
        }
        let mut lines = BTreeMap::new();
        for l in &config.transmission_lines {
            let line = Line::new(
                l.line_id,
                l.from_node,
                l.to_node,
                l.capacity_mw,
                l.length_km,
                l.resistance_per_km,
                l.reactance_per_km,
                config.base_voltage,
                l.initially_operational,
            )
            .map_err(|v| VoltEdgeError::ConfigurationInvalid(vec![v]))?;
            lines.insert(line.line_id, line);
        }
        Ok(Self {
            simulation_id,
            plants,
            lines,
            load_profile: config.load_profile,
            base_frequency_hz: config.base_frequency,
            base_voltage_kv: config.base_voltage,
            grid_frequency_hz: config.base_frequency,
            events: EventBatch::new(),
        })
    }

    /// Advances the grid by one tick of `dt_seconds` and returns the
    /// resulting snapshot. Implements the ten-step pipeline of `spec.md`
    /// §4.4 in order.
    pub fn tick(&mut self, tick_number: u64, dt_seconds: f64, clock: &dyn Clock) -> Snapshot {
        let tick_rate = Duration::from_secs_f64(dt_seconds);
        let simulation_time = clock.simulation_time(tick_number, tick_rate);

        // 1. Drain and apply queued events, in (timestamp, event_id) order.
        // A plant that receives a manual setpoint this tick is remembered so
        // step 4 doesn't immediately overwrite it with a demand-based target.
        let mut manually_targeted: BTreeSet<u32> = BTreeSet::new();
        for event in self.events.drain() {
            if let EventPayload::SetPoint { plant_id, .. } = &event.payload {
                manually_targeted.insert(*plant_id);
            }
            self.apply_event(event);
        }

        // 2. Weather-dependent plants' target for this tick is the weather
        // curve's value, computed here and applied by Plant::tick in step 5
        // (which also enforces any operator ceiling). Dispatch in step 4
        // never touches these plants at all.
        let weather_targets: BTreeMap<u32, f64> = self
            .plants
            .values()
            .filter(|p| p.kind.constants().weather_dependent)
            .map(|p| (p.plant_id, weather_target_mw(p.kind, p.max_capacity_mw, simulation_time)))
            .collect();

        // 3. Demand for this tick.
        let demand_mw = self
            .load_profile
            .demand_mw(self.simulation_id, tick_number, simulation_time);

        // 4. Dispatch controllable plants ascending by id, filling each to
        // full output before moving to the next, until demand is met or
        // capacity runs out. Ordering is structural (`BTreeMap` iterates
        // ascending), not a separate sort step. Weather-dependent plants and
        // plants with a manual setpoint this tick are left alone; their
        // locked output still counts against demand.
        let mut remaining = demand_mw;
        for plant in self.plants.values_mut() {
            if plant.kind.constants().weather_dependent || manually_targeted.contains(&plant.plant_id) {
                remaining -= plant.current_output_mw;
                continue;
            }
            if !matches!(
                plant.operating_state,
                crate::grid::plant::OperatingState::Online
            ) {
                continue;
            }
            let desired = remaining.max(0.0).min(plant.max_capacity_mw);
            plant.set_target_output_mw(desired);
            remaining -= desired;
        }
        let mut alerts = Vec::new();
        if remaining > 1e-6 {
            alerts.push(Alert::UnmetDemand { shortfall_mw: remaining });
        }

        // 5. Ramp every plant toward its target and resolve its own
        // maintenance/failure/weather state transitions.
        for plant in self.plants.values_mut() {
            let weather_target = weather_targets.get(&plant.plant_id).copied();
            plant.tick(dt_seconds, self.simulation_id, tick_number, weather_target);
        }

        // 6. Resolve line flows, ascending by id. Each line's sending-end
        // voltage tracks the net power balance (generation minus this
        // node's share of demand) at its source node, so flow actually
        // responds to dispatch instead of staying pinned at base voltage.
        let total_capacity_mw: f64 = self.plants.values().map(|p| p.max_capacity_mw).sum::<f64>().max(1.0);
        let mut generation_by_node: BTreeMap<u32, f64> = BTreeMap::new();
        for plant in self.plants.values() {
            *generation_by_node.entry(plant.node_id).or_insert(0.0) += plant.current_output_mw;
        }
        let mut nodes: BTreeSet<u32> = generation_by_node.keys().copied().collect();
        for line in self.lines.values() {
            nodes.insert(line.from_node);
            nodes.insert(line.to_node);
        }
        let demand_per_node = if nodes.is_empty() { 0.0 } else { demand_mw / nodes.len() as f64 };

        for line in self.lines.values_mut() {
            let injection = generation_by_node.get(&line.from_node).copied().unwrap_or(0.0) - demand_per_node;
            line.voltage_from = (self.base_voltage_kv
                * (1.0 + NODE_VOLTAGE_SENSITIVITY * injection / total_capacity_mw))
                .clamp(0.85 * self.base_voltage_kv, 1.15 * self.base_voltage_kv);
            let stream_id = u64::from(line.line_id) | (1 << 32);
            line.tick(
                dt_seconds,
                self.base_voltage_kv,
                self.simulation_id,
                stream_id,
                tick_number,
            );
        }

        let total_generation_mw: f64 = self.plants.values().map(|p| p.current_output_mw).sum();
        let total_consumption_mw = demand_mw;

        // 7. Frequency responds to the generation/consumption imbalance.
        let imbalance = total_generation_mw - total_consumption_mw;
        self.grid_frequency_hz = (self.base_frequency_hz
            + imbalance / total_generation_mw.max(1.0) * FREQUENCY_DAMPING)
            .clamp(45.0, 55.0);

        // 8. Per-node voltage field; the snapshot reports the first node's.
        let grid_voltage_kv = self.first_node_voltage();

        // 9. Cascade check: warn past a 2 Hz deviation, shed renewables
        // past 3 Hz.
        let deviation = (self.grid_frequency_hz - self.base_frequency_hz).abs();
        if deviation > FREQUENCY_WARNING_DEVIATION_HZ {
            alerts.push(Alert::FrequencyWarning { deviation_hz: deviation });
        }
        if deviation > CASCADE_DEVIATION_HZ {
            tracing::warn!(
                simulation_id = self.simulation_id,
                tick_number,
                frequency = self.grid_frequency_hz,
                "frequency cascade: shedding renewables"
            );
            for plant in self.plants.values_mut() {
                if matches!(plant.kind, PlantKind::Wind | PlantKind::Solar) {
                    plant.force_zero_output_this_tick();
                }
            }
        }

        // Recompute generation after the cascade may have zeroed renewables,
        // so the snapshot and efficiency figure reflect the shedding.
        let total_generation_mw: f64 = self.plants.values().map(|p| p.current_output_mw).sum();
        let efficiency_percentage = if total_consumption_mw > 0.0 {
            (total_generation_mw / total_consumption_mw * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        let mut active_failure_ids: Vec<u32> = self
            .plants
            .values()
            .filter(|p| p.is_failed())
            .map(|p| p.plant_id)
            .chain(self.lines.values().filter(|l| l.is_failed()).map(|l| l.line_id))
            .collect();
        active_failure_ids.sort_unstable();
        let fault_count = active_failure_ids.len() as u32;

        // 10. Assemble the externally visible snapshot.
        Snapshot {
            simulation_id: self.simulation_id,
            tick_number,
            timestamp: simulation_time,
            total_generation_mw,
            total_consumption_mw,
            grid_frequency_hz: self.grid_frequency_hz,
            grid_voltage_kv,
            efficiency_percentage,
            fault_count,
            active_failure_ids,
            alerts,
        }
    }

    fn first_node_voltage(&self) -> f64 {
        let nodes: BTreeSet<u32> = self
            .lines
            .values()
            .flat_map(|l| [l.from_node, l.to_node])
            .collect();
        match nodes.iter().next() {
            Some(&i) => self.base_voltage_kv * (1.0 + 0.05 * (0.1 * i as f64).sin()),
            None => self.base_voltage_kv,
        }
    }

    fn apply_event(&mut self, event: crate::grid::event::Event) {
        let outcome = match event.payload {
            EventPayload::Fault { component_id, kind } => fault::apply(self, component_id, kind),
            EventPayload::Repair { component_id } => fault::repair(self, component_id),
            EventPayload::SetPoint { plant_id, target_output_mw } => match self.plants.get_mut(&plant_id) {
                Some(p) if p.kind.constants().weather_dependent => {
                    p.set_operator_ceiling_mw(target_output_mw);
                    Ok(())
                }
                Some(p) => {
                    p.set_target_output_mw(target_output_mw);
                    Ok(())
                }
                None => Err(VoltEdgeError::UnknownComponent(plant_id)),
            },
        };
        if let Err(err) = outcome {
            tracing::warn!(event_id = event.event_id, error = %err, "event application failed");
        }
    }

    pub fn inject_fault(&mut self, component_id: u32, kind: fault::FaultKind) -> Result<(), VoltEdgeError> {
        fault::apply(self, component_id, kind)
    }

    pub fn repair_component(&mut self, component_id: u32) -> Result<(), VoltEdgeError> {
        fault::repair(self, component_id)
    }
}

#[cfg(test)]
impl GridModel {
    pub fn new_empty(base_voltage_kv: f64, base_frequency_hz: f64) -> Self {
        Self {
            simulation_id: 1,
            plants: BTreeMap::new(),
            lines: BTreeMap::new(),
            load_profile: LoadProfile {
                base_load_mw: 0.0,
                daily_variation: 0.0,
                random_variation: 0.0,
            },
            base_frequency_hz,
            base_voltage_kv,
            grid_frequency_hz: base_frequency_hz,
            events: EventBatch::new(),
        }
    }

    pub fn add_line_for_test(&mut self, line_id: u32, from_node: u32, to_node: u32) {
        let line = Line::new(line_id, from_node, to_node, 100.0, 10.0, 0.05, 0.1, self.base_voltage_kv, true)
            .unwrap();
        self.lines.insert(line_id, line);
    }

    pub fn add_plant_for_test(&mut self, plant_id: u32, kind: PlantKind, capacity: f64) {
        let plant = Plant::new(plant_id, kind, capacity, 0.4, true, capacity * 0.5, 0).unwrap();
        self.plants.insert(plant_id, plant);
    }
}
