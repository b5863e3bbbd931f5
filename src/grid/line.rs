//! Transmission line model (`spec.md` §3 "Line", §4.2 "LineModel").

use serde::Serialize;

use crate::error::ConfigViolation;
use crate::rng::component_stream;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// A transmission line's operating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Operational,
    Tripped,
}

/// One transmission line between two grid nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub line_id: u32,
    pub from_node: u32,
    pub to_node: u32,
    pub capacity_mw: f64,
    pub length_km: f64,
    resistance_per_km: f64,
    reactance_per_km: f64,
    pub operating_state: LineState,
    pub current_flow_mw: f64,
    pub voltage_from: f64,
    pub voltage_to: f64,
    pub power_loss_mw: f64,
    pub thermal_rating_mw: f64,
    pub operational_hours: f64,
    thermal_halved: bool,
    cyber_attack_active: bool,
}

impl Line {
    /// Creates a line, validating the invariants implied by `spec.md` §3.
    pub fn new(
        line_id: u32,
        from_node: u32,
        to_node: u32,
        capacity_mw: f64,
        length_km: f64,
        resistance_per_km: f64,
        reactance_per_km: f64,
        base_voltage_kv: f64,
        initially_operational: bool,
    ) -> Result<Self, ConfigViolation> {
        if !(capacity_mw > 0.0) {
            return Err(ConfigViolation::new(
                format!("transmission_lines[{line_id}].capacity_mw"),
                "must be > 0",
            ));
        }
        if !(length_km > 0.0) {
            return Err(ConfigViolation::new(
                format!("transmission_lines[{line_id}].length_km"),
                "must be > 0",
            ));
        }
        let operating_state = if initially_operational {
            LineState::Operational
        } else {
            LineState::Tripped
        };
        Ok(Self {
            line_id,
            from_node,
            to_node,
            capacity_mw,
            length_km,
            resistance_per_km,
            reactance_per_km,
            operating_state,
            current_flow_mw: 0.0,
            voltage_from: base_voltage_kv,
            voltage_to: base_voltage_kv,
            power_loss_mw: 0.0,
            thermal_rating_mw: 1.1 * capacity_mw,
            operational_hours: 0.0,
            thermal_halved: false,
            cyber_attack_active: false,
        })
    }

    /// Total line impedance magnitude in ohms.
    pub fn impedance_ohms(&self) -> f64 {
        let r = self.resistance_per_km * self.length_km;
        let x = self.reactance_per_km * self.length_km;
        (r * r + x * x).sqrt()
    }

    fn total_resistance_ohms(&self) -> f64 {
        self.resistance_per_km * self.length_km
    }

    fn rated_current(&self, base_voltage_kv: f64) -> f64 {
        self.capacity_mw * 1000.0 / (base_voltage_kv * SQRT_3)
    }

    /// Advances this line by one tick of `dt_seconds`, per §4.2.
    pub fn tick(
        &mut self,
        dt_seconds: f64,
        base_voltage_kv: f64,
        simulation_id: u64,
        line_id_stream: u64,
        tick_number: u64,
    ) {
        if self.operating_state == LineState::Tripped {
            self.current_flow_mw = 0.0;
            return;
        }

        let i_rated = self.rated_current(base_voltage_kv);

        // Thermal rating is derived from *last* tick's current: conductor
        // temperature lags the flow that heated it.
        let prev_current = current_from_flow(self.current_flow_mw, self.voltage_from);
        let heating = (prev_current / i_rated).powi(2);
        let conductor_temp = 25.0 + 50.0 * heating;
        let nominal_rating = 1.1 * self.capacity_mw;
        let derated = if conductor_temp > 75.0 {
            self.capacity_mw * (0.5_f64).max((100.0 - conductor_temp) / 75.0)
        } else {
            nominal_rating
        };
        self.thermal_rating_mw = if self.thermal_halved {
            derated * 0.5
        } else {
            derated
        };

        let z = self.impedance_ohms();
        let diff_kv = self.voltage_from - self.voltage_to;
        let raw_flow = if z > 0.0 {
            SQRT_3 * self.voltage_from * (diff_kv / z)
        } else {
            0.0
        };
        let raw_flow = if raw_flow.is_finite() { raw_flow } else { 0.0 };

        let raw_current = current_from_flow(raw_flow, self.voltage_from);
        let thermal_violation = raw_flow.abs() > self.thermal_rating_mw;
        let overcurrent = raw_current.abs() > 1.2 * i_rated;
        let overvoltage = self.voltage_from > 1.1 * base_voltage_kv;

        let flow_final = raw_flow.clamp(-self.thermal_rating_mw, self.thermal_rating_mw);
        let resistance = self.total_resistance_ohms();
        let voltage_to_new =
            (self.voltage_from - flow_final * resistance / 1000.0).clamp(
                0.87 * base_voltage_kv,
                1.09 * base_voltage_kv,
            );
        let undervoltage = voltage_to_new < 0.9 * base_voltage_kv;

        if thermal_violation || overcurrent || overvoltage || undervoltage {
            tracing::warn!(
                line_id = self.line_id,
                thermal_violation,
                overcurrent,
                overvoltage,
                undervoltage,
                "protection trip"
            );
            self.trip();
            return;
        }

        self.current_flow_mw = flow_final;
        self.voltage_to = voltage_to_new;
        self.power_loss_mw =
            (flow_final * 1000.0 / (self.voltage_from * SQRT_3)).powi(2) * resistance / 1e6;
        self.operational_hours += dt_seconds / 3600.0;

        let length_scaled_prob = 0.00005 * self.length_km;
        let mut rng = component_stream(simulation_id, line_id_stream, tick_number);
        if rng.next_f64() < length_scaled_prob {
            tracing::warn!(line_id = self.line_id, "random failure triggered");
            self.trip();
        }
    }

    /// Trips the line (flow drops to zero). Idempotent.
    pub fn trip(&mut self) {
        self.operating_state = LineState::Tripped;
        self.current_flow_mw = 0.0;
    }

    /// `cascading_failure`: halves the thermal rating (once) and trips
    /// immediately if current flow now exceeds it.
    pub fn apply_cascading_failure(&mut self) {
        if !self.thermal_halved {
            self.thermal_rating_mw *= 0.5;
            self.thermal_halved = true;
        }
        if self.current_flow_mw.abs() > self.thermal_rating_mw {
            self.trip();
        }
    }

    /// `cyber_attack`: the externally-observed flow reading is falsified;
    /// physical flow is unaffected. Idempotent.
    pub fn apply_cyber_attack(&mut self) {
        self.cyber_attack_active = true;
    }

    /// The flow an external monitoring system would observe, which differs
    /// from [`Line::current_flow_mw`] only under an active `cyber_attack`.
    pub fn observed_flow_mw(&self) -> f64 {
        if self.cyber_attack_active {
            self.current_flow_mw * 1.5
        } else {
            self.current_flow_mw
        }
    }

    /// Clears all latched fault state and returns the line to service. The
    /// flow itself is recomputed on the next tick.
    pub fn repair(&mut self) {
        self.operating_state = LineState::Operational;
        self.thermal_halved = false;
        self.cyber_attack_active = false;
        self.thermal_rating_mw = 1.1 * self.capacity_mw;
    }

    pub fn is_failed(&self) -> bool {
        self.operating_state == LineState::Tripped
    }
}

fn current_from_flow(flow_mw: f64, voltage_kv: f64) -> f64 {
    if voltage_kv <= 0.0 {
        return 0.0;
    }
    flow_mw * 1000.0 / (voltage_kv * SQRT_3)
}
