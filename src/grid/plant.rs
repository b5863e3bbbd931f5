//! Generator model (`spec.md` §3 "Plant", §4.1 "PlantModel").

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigViolation, VoltEdgeError};
use crate::rng::component_stream;

/// A generator kind. Fixes the derived constants looked up via
/// [`PlantKind::constants`] — no per-instance vtable, per §9 Design Notes
/// "Dynamic dispatch on plant kind".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantKind {
    Coal,
    Gas,
    Nuclear,
    Hydro,
    Wind,
    Solar,
    BatteryStorage,
    Geothermal,
}

/// Derived constants for one [`PlantKind`], shared by every plant of that
/// kind.
#[derive(Debug, Clone, Copy)]
pub struct PlantKindConstants {
    /// Minimum output as a fraction of `max_capacity_mw` while online.
    pub min_output_ratio: f64,
    /// Maximum ramp rate as a fraction of `max_capacity_mw` per minute.
    pub ramp_ratio_per_min: f64,
    /// Heat rate (BTU per kWh); informational, used only for reporting.
    pub heat_rate_btu_per_kwh: f64,
    /// CO2 emission factor (kg per MWh generated).
    pub co2_factor_kg_per_mwh: f64,
    /// Hours of online operation between scheduled maintenance.
    pub maintenance_interval_hours: f64,
    /// Baseline per-tick random failure probability before the
    /// operational-hours multiplier in §4.1 is applied.
    pub base_failure_prob: f64,
    /// Nameplate capacity factor; informational only in this engine.
    pub capacity_factor: f64,
    /// Whether output tracks a weather curve rather than operator setpoints.
    pub weather_dependent: bool,
}

impl PlantKind {
    /// Returns the derived constants table entry for this kind.
    pub fn constants(self) -> PlantKindConstants {
        use PlantKind::*;
        match self {
            Coal => PlantKindConstants {
                min_output_ratio: 0.30,
                ramp_ratio_per_min: 0.02,
                heat_rate_btu_per_kwh: 9800.0,
                co2_factor_kg_per_mwh: 950.0,
                maintenance_interval_hours: 4380.0,
                base_failure_prob: 0.0008,
                capacity_factor: 0.55,
                weather_dependent: false,
            },
            Gas => PlantKindConstants {
                min_output_ratio: 0.20,
                ramp_ratio_per_min: 0.08,
                heat_rate_btu_per_kwh: 7500.0,
                co2_factor_kg_per_mwh: 450.0,
                maintenance_interval_hours: 8760.0,
                base_failure_prob: 0.0006,
                capacity_factor: 0.45,
                weather_dependent: false,
            },
            Nuclear => PlantKindConstants {
                min_output_ratio: 0.70,
                ramp_ratio_per_min: 0.005,
                heat_rate_btu_per_kwh: 10400.0,
                co2_factor_kg_per_mwh: 12.0,
                maintenance_interval_hours: 13140.0,
                base_failure_prob: 0.0001,
                capacity_factor: 0.90,
                weather_dependent: false,
            },
            Hydro => PlantKindConstants {
                min_output_ratio: 0.10,
                ramp_ratio_per_min: 0.15,
                heat_rate_btu_per_kwh: 0.0,
                co2_factor_kg_per_mwh: 24.0,
                maintenance_interval_hours: 8760.0,
                base_failure_prob: 0.0003,
                capacity_factor: 0.40,
                weather_dependent: true,
            },
            Wind => PlantKindConstants {
                min_output_ratio: 0.0,
                ramp_ratio_per_min: 0.25,
                heat_rate_btu_per_kwh: 0.0,
                co2_factor_kg_per_mwh: 11.0,
                maintenance_interval_hours: 4380.0,
                base_failure_prob: 0.0010,
                capacity_factor: 0.35,
                weather_dependent: true,
            },
            Solar => PlantKindConstants {
                min_output_ratio: 0.0,
                ramp_ratio_per_min: 0.30,
                heat_rate_btu_per_kwh: 0.0,
                co2_factor_kg_per_mwh: 5.0,
                maintenance_interval_hours: 4380.0,
                base_failure_prob: 0.0005,
                capacity_factor: 0.25,
                weather_dependent: true,
            },
            BatteryStorage => PlantKindConstants {
                min_output_ratio: 0.0,
                ramp_ratio_per_min: 0.50,
                heat_rate_btu_per_kwh: 0.0,
                co2_factor_kg_per_mwh: 0.0,
                maintenance_interval_hours: 8760.0,
                base_failure_prob: 0.0004,
                capacity_factor: 0.20,
                weather_dependent: false,
            },
            Geothermal => PlantKindConstants {
                min_output_ratio: 0.50,
                ramp_ratio_per_min: 0.03,
                heat_rate_btu_per_kwh: 0.0,
                co2_factor_kg_per_mwh: 38.0,
                maintenance_interval_hours: 8760.0,
                base_failure_prob: 0.0003,
                capacity_factor: 0.70,
                weather_dependent: false,
            },
        }
    }
}

/// The hours a plant spends in `maintenance` before returning to `online`.
/// Not specified numerically by the source spec's state diagram; fixed
/// here as a normative constant (see `DESIGN.md`).
pub const MAINTENANCE_DURATION_HOURS: f64 = 24.0;

/// A generator's operating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    Online,
    Offline,
    Maintenance,
    Fault,
    Startup,
    Shutdown,
}

/// One generator.
#[derive(Debug, Clone, Serialize)]
pub struct Plant {
    pub plant_id: u32,
    pub kind: PlantKind,
    /// Grid node (bus) this plant injects power at (`spec.md` §6
    /// `power_plants[].location`).
    pub node_id: u32,
    pub max_capacity_mw: f64,
    pub efficiency: f64,
    pub min_output_mw: f64,
    pub operating_state: OperatingState,
    pub current_output_mw: f64,
    pub target_output_mw: f64,
    pub operational_hours: f64,
    pub next_maintenance_due_hours: f64,
    maintenance_remaining_hours: f64,
    /// Operator-imposed upper bound on `target_output_mw` for
    /// weather-dependent kinds; defaults to `max_capacity_mw` (no
    /// restriction beyond physical capacity). Set only via
    /// [`Plant::set_operator_ceiling_mw`], never overwritten by the weather
    /// curve itself.
    operator_ceiling_mw: f64,
}

impl Plant {
    /// Creates a plant, validating capability invariants from `spec.md` §3.
    pub fn new(
        plant_id: u32,
        kind: PlantKind,
        max_capacity_mw: f64,
        efficiency: f64,
        initially_online: bool,
        initial_output_mw: f64,
        node_id: u32,
    ) -> Result<Self, ConfigViolation> {
        if !(max_capacity_mw >= 0.0) {
            return Err(ConfigViolation::new(
                format!("power_plants[{plant_id}].capacity_mw"),
                "must be >= 0",
            ));
        }
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            return Err(ConfigViolation::new(
                format!("power_plants[{plant_id}].efficiency"),
                "must be in (0, 1]",
            ));
        }
        let min_output_mw = kind.constants().min_output_ratio * max_capacity_mw;
        let operating_state = if initially_online {
            OperatingState::Online
        } else {
            OperatingState::Offline
        };
        let current_output_mw = if initially_online {
            initial_output_mw.clamp(min_output_mw, max_capacity_mw)
        } else {
            0.0
        };
        Ok(Self {
            plant_id,
            kind,
            node_id,
            max_capacity_mw,
            efficiency,
            min_output_mw,
            operating_state,
            current_output_mw,
            target_output_mw: current_output_mw,
            operational_hours: 0.0,
            next_maintenance_due_hours: kind.constants().maintenance_interval_hours,
            maintenance_remaining_hours: 0.0,
            operator_ceiling_mw: max_capacity_mw,
        })
    }

    /// Sets a new operator target, clamped to `[min_output_mw,
    /// max_capacity_mw]` per §3 invariants. For weather-dependent kinds this
    /// is overwritten every tick by the weather curve in [`Plant::tick`], so
    /// it has no lasting effect there — use
    /// [`Plant::set_operator_ceiling_mw`] instead.
    pub fn set_target_output_mw(&mut self, mw: f64) {
        self.target_output_mw = clamp_finite(mw, self.min_output_mw, self.max_capacity_mw);
    }

    /// Sets the operator ceiling that bounds a weather-dependent plant's
    /// target above the weather curve's own value, per §4.1: "Grid operator
    /// setpoints are ignored for weather-dependent kinds except as capacity
    /// ceilings." Has no effect on non-weather-dependent kinds, whose target
    /// is set directly via [`Plant::set_target_output_mw`].
    pub fn set_operator_ceiling_mw(&mut self, mw: f64) {
        self.operator_ceiling_mw = clamp_finite(mw, 0.0, self.max_capacity_mw);
    }

    /// Advances this plant by one tick of `dt_seconds`, per §4.1.
    ///
    /// `weather_target_mw` is `Some` only for weather-dependent kinds and is
    /// the deterministic function-of-time value computed by the caller
    /// (`GridModel`, which owns the simulation-time context).
    pub fn tick(
        &mut self,
        dt_seconds: f64,
        simulation_id: u64,
        tick_number: u64,
        weather_target_mw: Option<f64>,
    ) {
        match self.operating_state {
            OperatingState::Offline | OperatingState::Fault => {
                self.current_output_mw = 0.0;
                return;
            }
            OperatingState::Startup => {
                self.operating_state = OperatingState::Online;
                self.current_output_mw = self.min_output_mw;
                return;
            }
            OperatingState::Shutdown => {
                self.operating_state = OperatingState::Offline;
                self.current_output_mw = 0.0;
                self.target_output_mw = 0.0;
                return;
            }
            OperatingState::Maintenance => {
                let dt_hours = dt_seconds / 3600.0;
                self.maintenance_remaining_hours -= dt_hours;
                self.current_output_mw = 0.0;
                if self.maintenance_remaining_hours <= 0.0 {
                    self.operating_state = OperatingState::Online;
                    self.operational_hours = 0.0;
                }
                return;
            }
            OperatingState::Online => {}
        }

        let constants = self.kind.constants();
        if constants.weather_dependent {
            if let Some(w) = weather_target_mw {
                self.target_output_mw = w.clamp(0.0, self.max_capacity_mw).min(self.operator_ceiling_mw);
            }
        }

        let dt_minutes = dt_seconds / 60.0;
        let max_step = constants.ramp_ratio_per_min * self.max_capacity_mw * dt_minutes;
        let delta = self.target_output_mw - self.current_output_mw;
        let step = delta.clamp(-max_step, max_step);
        self.current_output_mw = clamp_finite(
            self.current_output_mw + step,
            self.min_output_mw,
            self.max_capacity_mw,
        );

        let dt_hours = dt_seconds / 3600.0;
        self.operational_hours += dt_hours;

        if self.operational_hours >= self.next_maintenance_due_hours {
            self.operating_state = OperatingState::Maintenance;
            self.current_output_mw = 0.0;
            self.target_output_mw = 0.0;
            self.maintenance_remaining_hours = MAINTENANCE_DURATION_HOURS;
            self.next_maintenance_due_hours =
                self.operational_hours + constants.maintenance_interval_hours;
            return;
        }

        let mut rng = component_stream(simulation_id, self.plant_id as u64, tick_number);
        let draw = rng.next_f64();
        let failure_prob =
            constants.base_failure_prob * (1.0 + self.operational_hours / 8760.0);
        if draw < failure_prob {
            tracing::warn!(plant_id = self.plant_id, "random failure triggered");
            self.operating_state = OperatingState::Fault;
            self.current_output_mw = 0.0;
            self.target_output_mw = 0.0;
        }
    }

    /// Forces this plant offline (protective cascade shutdown, or an
    /// external `plant_outage` fault). No-op if already non-operational.
    pub fn force_outage(&mut self) {
        if self.operating_state == OperatingState::Fault {
            return;
        }
        self.operating_state = OperatingState::Fault;
        self.current_output_mw = 0.0;
        self.target_output_mw = 0.0;
    }

    /// Forces the renewable cascade response: zero output this tick without
    /// a state transition (the plant remains `online` for dispatch next
    /// tick, unlike `force_outage`).
    pub fn force_zero_output_this_tick(&mut self) {
        self.current_output_mw = 0.0;
    }

    /// Permanently removes the plant from service until [`Plant::repair`]
    /// is called (`natural_disaster`).
    pub fn force_permanent_offline(&mut self) {
        self.operating_state = OperatingState::Offline;
        self.current_output_mw = 0.0;
        self.target_output_mw = 0.0;
    }

    /// `cyber_attack`: pins output to 10% of capacity and marks the plant
    /// faulted. Idempotent.
    pub fn apply_cyber_attack(&mut self) {
        self.operating_state = OperatingState::Fault;
        self.current_output_mw = 0.0;
        self.target_output_mw = 0.1 * self.max_capacity_mw;
    }

    /// Begins repair: moves a non-operational plant back toward `online`
    /// via the `offline → startup → online` path. No-op while already
    /// online, starting up, or shutting down.
    pub fn repair(&mut self) {
        match self.operating_state {
            OperatingState::Fault | OperatingState::Offline => {
                self.operating_state = OperatingState::Startup;
            }
            _ => {}
        }
    }

    /// Returns `true` when this plant counts as an active failure for
    /// `Snapshot.active_failure_ids`.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.operating_state,
            OperatingState::Fault | OperatingState::Offline | OperatingState::Maintenance
        )
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

/// Deterministic weather curves for §4.1's wind/solar/hydro kinds, driven
/// purely by `simulation_time` (never by operator setpoints beyond the
/// capacity ceiling applied by [`Plant::tick`]).
pub fn weather_target_mw(kind: PlantKind, max_capacity_mw: f64, simulation_time: Duration) -> f64 {
    let seconds_in_day = simulation_time.as_secs_f64() % 86400.0;
    let hour = seconds_in_day / 3600.0;

    match kind {
        PlantKind::Solar => {
            if (6.0..18.0).contains(&hour) {
                let phase = (hour - 6.0) / 12.0 * std::f64::consts::PI;
                max_capacity_mw * phase.sin()
            } else {
                0.0
            }
        }
        PlantKind::Wind => {
            // Phase-shifted sine, never fully zero, floored at 5% capacity.
            let phase = 2.0 * std::f64::consts::PI * (hour / 24.0) + std::f64::consts::FRAC_PI_4;
            let base = 0.5 + 0.45 * phase.sin();
            (max_capacity_mw * base).max(0.05 * max_capacity_mw)
        }
        PlantKind::Hydro => {
            // Slow seasonal variation over a 365-day cycle.
            let day = simulation_time.as_secs_f64() / 86400.0;
            let seasonal = 2.0 * std::f64::consts::PI * (day / 365.0);
            let base = 0.6 + 0.3 * seasonal.sin();
            max_capacity_mw * base.clamp(0.0, 1.0)
        }
        _ => max_capacity_mw,
    }
}

/// Validated construction used by [`crate::config::ScenarioConfig`]; wraps
/// [`Plant::new`]'s `ConfigViolation` into the crate's public error type.
pub fn new_validated(
    plant_id: u32,
    kind: PlantKind,
    max_capacity_mw: f64,
    efficiency: f64,
    initially_online: bool,
    initial_output_mw: f64,
    node_id: u32,
) -> Result<Plant, VoltEdgeError> {
    Plant::new(
        plant_id,
        kind,
        max_capacity_mw,
        efficiency,
        initially_online,
        initial_output_mw,
        node_id,
    )
    .map_err(|v| VoltEdgeError::ConfigurationInvalid(vec![v]))
}
