//! Scenario configuration: schema, parsing, and validation (`spec.md` §6).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigViolation;
use crate::grid::{LoadProfile, PlantKind};

/// One power plant's static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    pub plant_id: u32,
    pub kind: PlantKind,
    pub max_capacity_mw: f64,
    pub efficiency: f64,
    /// Grid node this plant injects power at. References a
    /// [`LineConfig::from_node`]/[`LineConfig::to_node`] id when
    /// `transmission_lines` is non-empty; unconstrained in a topology-free
    /// (line-less) scenario.
    #[serde(default)]
    pub node_id: u32,
    #[serde(default = "default_true")]
    pub initially_online: bool,
    #[serde(default)]
    pub initial_output_mw: f64,
}

/// One transmission line's static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    pub line_id: u32,
    pub from_node: u32,
    pub to_node: u32,
    pub capacity_mw: f64,
    pub length_km: f64,
    pub resistance_per_km: f64,
    pub reactance_per_km: f64,
    #[serde(default = "default_true")]
    pub initially_operational: bool,
}

fn default_true() -> bool {
    true
}

/// The full, validated configuration for one simulation, per `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub tick_rate_ms: u64,
    #[serde(default = "default_max_simulations")]
    pub max_simulations: usize,
    #[serde(default = "default_base_frequency")]
    pub base_frequency: f64,
    #[serde(default = "default_base_voltage")]
    pub base_voltage: f64,
    pub power_plants: Vec<PlantConfig>,
    pub transmission_lines: Vec<LineConfig>,
    pub load_profile: LoadProfile,
    #[serde(default = "default_retention_window_s")]
    pub retention_window_s: u64,
    /// Maximum wall-clock runtime before the simulation is forced into
    /// `error` with `TimedOut` (§5). `None` means no budget.
    #[serde(default)]
    pub max_wall_clock_s: Option<u64>,
}

fn default_max_simulations() -> usize {
    64
}

fn default_base_frequency() -> f64 {
    50.0
}

fn default_base_voltage() -> f64 {
    230.0
}

fn default_retention_window_s() -> u64 {
    3600
}

impl ScenarioConfig {
    /// Parses a scenario from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigViolation> {
        toml::from_str(text).map_err(|e| ConfigViolation::new("<toml>", e.to_string()))
    }

    /// Parses a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigViolation> {
        serde_json::from_str(text).map_err(|e| ConfigViolation::new("<json>", e.to_string()))
    }

    /// Checks every cross-field invariant `spec.md` §6 requires, returning
    /// every violation found rather than failing fast on the first.
    pub fn validate(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();

        if self.tick_rate_ms == 0 {
            violations.push(ConfigViolation::new("tick_rate_ms", "must be > 0"));
        }
        if self.max_simulations == 0 {
            violations.push(ConfigViolation::new("max_simulations", "must be > 0"));
        }
        if !(self.base_frequency > 0.0) {
            violations.push(ConfigViolation::new("base_frequency", "must be > 0"));
        }
        if !(self.base_voltage > 0.0) {
            violations.push(ConfigViolation::new("base_voltage", "must be > 0"));
        }
        if matches!(self.max_wall_clock_s, Some(0)) {
            violations.push(ConfigViolation::new("max_wall_clock_s", "must be > 0 if set"));
        }

        let valid_nodes: HashSet<u32> = self
            .transmission_lines
            .iter()
            .flat_map(|l| [l.from_node, l.to_node])
            .collect();

        let mut seen_plant_ids = HashSet::new();
        for p in &self.power_plants {
            if !seen_plant_ids.insert(p.plant_id) {
                violations.push(ConfigViolation::new(
                    format!("power_plants[{}]", p.plant_id),
                    "duplicate plant_id",
                ));
            }
            if !(p.max_capacity_mw >= 0.0) {
                violations.push(ConfigViolation::new(
                    format!("power_plants[{}].max_capacity_mw", p.plant_id),
                    "must be >= 0",
                ));
            }
            if !(p.efficiency > 0.0 && p.efficiency <= 1.0) {
                violations.push(ConfigViolation::new(
                    format!("power_plants[{}].efficiency", p.plant_id),
                    "must be in (0, 1]",
                ));
            }
            if !valid_nodes.is_empty() && !valid_nodes.contains(&p.node_id) {
                violations.push(ConfigViolation::new(
                    format!("power_plants[{}].node_id", p.plant_id),
                    "references a node not present in any transmission_line",
                ));
            }
        }

        let mut seen_line_ids = HashSet::new();
        for l in &self.transmission_lines {
            if !seen_line_ids.insert(l.line_id) {
                violations.push(ConfigViolation::new(
                    format!("transmission_lines[{}]", l.line_id),
                    "duplicate line_id",
                ));
            }
            if l.from_node == l.to_node {
                violations.push(ConfigViolation::new(
                    format!("transmission_lines[{}]", l.line_id),
                    "from_node and to_node must differ",
                ));
            }
            if !(l.capacity_mw > 0.0) {
                violations.push(ConfigViolation::new(
                    format!("transmission_lines[{}].capacity_mw", l.line_id),
                    "must be > 0",
                ));
            }
            if !(l.length_km > 0.0) {
                violations.push(ConfigViolation::new(
                    format!("transmission_lines[{}].length_km", l.line_id),
                    "must be > 0",
                ));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid() -> ScenarioConfig {
        ScenarioConfig {
            tick_rate_ms: 1000,
            max_simulations: 8,
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
            transmission_lines: vec![],
            load_profile: LoadProfile {
                base_load_mw: 100.0,
                daily_variation: 0.1,
                random_variation: 0.02,
            },
            retention_window_s: 3600,
            max_wall_clock_s: None,
        }
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(minimal_valid().validate().is_empty());
    }

    #[test]
    fn duplicate_plant_ids_are_rejected() {
        let mut config = minimal_valid();
        let mut dup = config.power_plants[0].clone();
        dup.plant_id = 1;
        config.power_plants.push(dup);
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.message.contains("duplicate")));
    }

    #[test]
    fn self_loop_line_is_rejected() {
        let mut config = minimal_valid();
        config.transmission_lines.push(LineConfig {
            line_id: 1,
            from_node: 0,
            to_node: 0,
            capacity_mw: 100.0,
            length_km: 10.0,
            resistance_per_km: 0.05,
            reactance_per_km: 0.1,
            initially_operational: true,
        });
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.message.contains("differ")));
    }

    #[test]
    fn plant_referencing_nonexistent_node_is_rejected() {
        let mut config = minimal_valid();
        config.power_plants[0].node_id = 7;
        config.transmission_lines.push(LineConfig {
            line_id: 1,
            from_node: 0,
            to_node: 1,
            capacity_mw: 100.0,
            length_km: 10.0,
            resistance_per_km: 0.05,
            reactance_per_km: 0.1,
            initially_operational: true,
        });
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.field.contains("node_id")));
    }

    #[test]
    fn plant_node_id_is_unconstrained_without_any_lines() {
        let mut config = minimal_valid();
        config.power_plants[0].node_id = 999;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn zero_wall_clock_budget_is_rejected() {
        let mut config = minimal_valid();
        config.max_wall_clock_s = Some(0);
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.field == "max_wall_clock_s"));
    }

    #[test]
    fn toml_round_trips_through_validation() {
        let config = minimal_valid();
        let text = toml::to_string(&config).unwrap();
        let parsed = ScenarioConfig::from_toml(&text).unwrap();
        assert!(parsed.validate().is_empty());
    }
}
