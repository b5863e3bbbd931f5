//! Fault injection (`spec.md` §4.5 "FaultInjector").

use serde::{Deserialize, Serialize};

use crate::error::VoltEdgeError;
use crate::grid::model::GridModel;

/// The six fault kinds `spec.md` §4.5 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    PlantOutage,
    LineTrip,
    SubstationFailure,
    CascadingFailure,
    CyberAttack,
    NaturalDisaster,
}

impl FaultKind {
    fn name(self) -> &'static str {
        match self {
            FaultKind::PlantOutage => "plant_outage",
            FaultKind::LineTrip => "line_trip",
            FaultKind::SubstationFailure => "substation_failure",
            FaultKind::CascadingFailure => "cascading_failure",
            FaultKind::CyberAttack => "cyber_attack",
            FaultKind::NaturalDisaster => "natural_disaster",
        }
    }
}

/// Applies `kind` to `component_id` within `grid`.
///
/// For `substation_failure`, `component_id` is interpreted as a grid node
/// id: every line incident to that node is tripped. For every other kind,
/// `component_id` is a plant or line id as appropriate.
pub fn apply(grid: &mut GridModel, component_id: u32, kind: FaultKind) -> Result<(), VoltEdgeError> {
    match kind {
        FaultKind::PlantOutage => {
            if let Some(plant) = grid.plants.get_mut(&component_id) {
                tracing::warn!(plant_id = component_id, fault = kind.name(), "fault injected");
                plant.force_outage();
                return Ok(());
            }
            if grid.lines.contains_key(&component_id) {
                return Err(VoltEdgeError::UnsupportedFault { kind: kind.name().to_string() });
            }
            Err(VoltEdgeError::UnknownComponent(component_id))
        }
        FaultKind::LineTrip => {
            if let Some(line) = grid.lines.get_mut(&component_id) {
                tracing::warn!(line_id = component_id, fault = kind.name(), "fault injected");
                line.trip();
                return Ok(());
            }
            if grid.plants.contains_key(&component_id) {
                return Err(VoltEdgeError::UnsupportedFault { kind: kind.name().to_string() });
            }
            Err(VoltEdgeError::UnknownComponent(component_id))
        }
        FaultKind::SubstationFailure => {
            let node_id = component_id;
            let mut touched = 0usize;
            for line in grid.lines.values_mut() {
                if line.from_node == node_id || line.to_node == node_id {
                    line.trip();
                    touched += 1;
                }
            }
            if touched == 0 {
                if grid.plants.contains_key(&node_id) {
                    return Err(VoltEdgeError::UnsupportedFault { kind: kind.name().to_string() });
                }
                return Err(VoltEdgeError::UnknownComponent(component_id));
            }
            tracing::warn!(node_id, lines_tripped = touched, "substation failure injected");
            Ok(())
        }
        FaultKind::CascadingFailure => {
            if let Some(line) = grid.lines.get_mut(&component_id) {
                tracing::warn!(line_id = component_id, fault = kind.name(), "fault injected");
                line.apply_cascading_failure();
                return Ok(());
            }
            if let Some(plant) = grid.plants.get(&component_id) {
                let _ = plant;
                tracing::warn!(
                    plant_id = component_id,
                    fault = kind.name(),
                    "cascading failure: shedding renewables"
                );
                for p in grid.plants.values_mut() {
                    if matches!(
                        p.kind,
                        crate::grid::plant::PlantKind::Wind | crate::grid::plant::PlantKind::Solar
                    ) {
                        p.force_zero_output_this_tick();
                    }
                }
                return Ok(());
            }
            Err(VoltEdgeError::UnknownComponent(component_id))
        }
        FaultKind::CyberAttack => {
            if let Some(plant) = grid.plants.get_mut(&component_id) {
                tracing::warn!(plant_id = component_id, fault = kind.name(), "fault injected");
                plant.apply_cyber_attack();
                return Ok(());
            }
            if let Some(line) = grid.lines.get_mut(&component_id) {
                tracing::warn!(line_id = component_id, fault = kind.name(), "fault injected");
                line.apply_cyber_attack();
                return Ok(());
            }
            Err(VoltEdgeError::UnknownComponent(component_id))
        }
        FaultKind::NaturalDisaster => {
            if let Some(plant) = grid.plants.get_mut(&component_id) {
                tracing::warn!(plant_id = component_id, fault = kind.name(), "fault injected");
                plant.force_permanent_offline();
                return Ok(());
            }
            if let Some(line) = grid.lines.get_mut(&component_id) {
                tracing::warn!(line_id = component_id, fault = kind.name(), "fault injected");
                line.trip();
                return Ok(());
            }
            Err(VoltEdgeError::UnknownComponent(component_id))
        }
    }
}

/// Repairs the component, whatever kind it is. No-op for components already
/// healthy.
pub fn repair(grid: &mut GridModel, component_id: u32) -> Result<(), VoltEdgeError> {
    if let Some(plant) = grid.plants.get_mut(&component_id) {
        plant.repair();
        return Ok(());
    }
    if let Some(line) = grid.lines.get_mut(&component_id) {
        line.repair();
        return Ok(());
    }
    Err(VoltEdgeError::UnknownComponent(component_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::model::GridModel;

    #[test]
    fn unknown_component_is_rejected() {
        let mut grid = GridModel::new_empty(230.0, 50.0);
        let err = apply(&mut grid, 999, FaultKind::PlantOutage).unwrap_err();
        assert_eq!(err, VoltEdgeError::UnknownComponent(999));
    }

    #[test]
    fn substation_failure_trips_all_incident_lines() {
        let mut grid = GridModel::new_empty(230.0, 50.0);
        grid.add_line_for_test(1, 5, 6);
        grid.add_line_for_test(2, 6, 7);
        grid.add_line_for_test(3, 9, 10);
        apply(&mut grid, 6, FaultKind::SubstationFailure).unwrap();
        assert!(grid.lines[&1].is_failed());
        assert!(grid.lines[&2].is_failed());
        assert!(!grid.lines[&3].is_failed());
    }

    #[test]
    fn plant_outage_on_a_line_id_is_unsupported_not_unknown() {
        let mut grid = GridModel::new_empty(230.0, 50.0);
        grid.add_line_for_test(1, 0, 1);
        let err = apply(&mut grid, 1, FaultKind::PlantOutage).unwrap_err();
        assert_eq!(err, VoltEdgeError::UnsupportedFault { kind: "plant_outage".to_string() });
    }

    #[test]
    fn line_trip_on_a_plant_id_is_unsupported_not_unknown() {
        let mut grid = GridModel::new_empty(230.0, 50.0);
        grid.add_plant_for_test(1, crate::grid::plant::PlantKind::Coal, 100.0);
        let err = apply(&mut grid, 1, FaultKind::LineTrip).unwrap_err();
        assert_eq!(err, VoltEdgeError::UnsupportedFault { kind: "line_trip".to_string() });
    }
}
