//! End-to-end scenarios mirroring the concrete walkthroughs used to design
//! the engine's dispatch, fault, and determinism behavior.

use voltedge::config::{LineConfig, PlantConfig, ScenarioConfig};
use voltedge::grid::{Alert, FaultKind, LoadProfile, PlantKind};
use voltedge::Orchestrator;

fn coal_plant(capacity: f64, initial_output: f64) -> PlantConfig {
    PlantConfig {
        plant_id: 1,
        kind: PlantKind::Coal,
        max_capacity_mw: capacity,
        efficiency: 0.4,
        node_id: 0,
        initially_online: true,
        initial_output_mw: initial_output,
    }
}

fn flat_load(base_load_mw: f64) -> LoadProfile {
    LoadProfile {
        base_load_mw,
        daily_variation: 0.0,
        random_variation: 0.0,
    }
}

fn config_with_plants(power_plants: Vec<PlantConfig>, load: LoadProfile, tick_rate_ms: u64) -> ScenarioConfig {
    ScenarioConfig {
        tick_rate_ms,
        max_simulations: 8,
        base_frequency: 50.0,
        base_voltage: 230.0,
        power_plants,
        transmission_lines: vec![],
        load_profile: load,
        retention_window_s: 3600,
        max_wall_clock_s: None,
    }
}

/// S1 — Steady state balance.
#[test]
fn steady_state_balance() {
    let config = config_with_plants(vec![coal_plant(500.0, 300.0)], flat_load(300.0), 100);
    let orchestrator = Orchestrator::new(4);
    let id = orchestrator.create_simulation(config).unwrap();

    let snapshots = orchestrator.run_until(id, 10).unwrap();
    let last = snapshots.last().unwrap();

    assert!((last.total_generation_mw - 300.0).abs() < 1e-6);
    assert!((last.total_consumption_mw - 300.0).abs() < 1e-6);
    assert!((last.grid_frequency_hz - 50.0).abs() < 0.01);
    assert_eq!(last.fault_count, 0);
}

/// S2 — Shortfall.
#[test]
fn shortfall_raises_unmet_demand_and_clamps_frequency() {
    let config = config_with_plants(vec![], flat_load(300.0), 100);
    let orchestrator = Orchestrator::new(4);
    let id = orchestrator.create_simulation(config).unwrap();

    let snapshots = orchestrator.run_until(id, 1).unwrap();
    let snap = &snapshots[0];

    assert_eq!(snap.fault_count, 0);
    assert_eq!(snap.total_generation_mw, 0.0);
    assert!(snap.alerts.iter().any(|a| matches!(
        a,
        Alert::UnmetDemand { shortfall_mw } if (shortfall_mw - 300.0).abs() < 1.0
    )));
    assert_eq!(snap.grid_frequency_hz, 45.0);
}

/// S3 — Fault injection.
#[test]
fn plant_outage_takes_effect_from_the_next_tick() {
    let config = config_with_plants(vec![coal_plant(500.0, 300.0)], flat_load(300.0), 100);
    let orchestrator = Orchestrator::new(4);
    let id = orchestrator.create_simulation(config).unwrap();

    orchestrator.run_until(id, 5).unwrap();
    orchestrator.inject_fault(id, 1, 1, FaultKind::PlantOutage).unwrap();
    let snapshots = orchestrator.run_until(id, 10).unwrap();

    let last = snapshots.last().unwrap();
    assert_eq!(last.active_failure_ids, vec![1]);
    assert!(last.alerts.iter().any(|a| matches!(a, Alert::UnmetDemand { .. })));
}

/// S4 — Cascade: a large enough generation shortfall drives frequency past
/// the cascade threshold and sheds the wind plant's output for that tick.
#[test]
fn severe_deficit_sheds_wind_output() {
    let config = config_with_plants(
        vec![
            coal_plant(250.0, 250.0),
            PlantConfig {
                plant_id: 2,
                kind: PlantKind::Wind,
                max_capacity_mw: 100.0,
                efficiency: 0.3,
                node_id: 0,
                initially_online: true,
                initial_output_mw: 50.0,
            },
        ],
        flat_load(30_000.0),
        100,
    );
    let orchestrator = Orchestrator::new(4);
    let id = orchestrator.create_simulation(config).unwrap();

    let snapshots = orchestrator.run_until(id, 5).unwrap();
    let last = snapshots.last().unwrap();

    assert!((last.grid_frequency_hz - 45.0).abs() < 1e-9);
    assert!(last.alerts.iter().any(|a| matches!(a, Alert::FrequencyWarning { .. })));
}

/// S5 — Line trip on overcurrent: a plant's node is starved relative to a
/// sustained demand far beyond its capacity, driving that node's voltage to
/// the coupling floor and producing a raw flow far beyond the line's
/// thermal rating through the real dispatch/coupling path (no fault is
/// injected here — the trip is a consequence of normal operation under a
/// severe, sustained deficit).
#[test]
fn overcurrent_trips_line_under_sustained_deficit() {
    let config = ScenarioConfig {
        tick_rate_ms: 100,
        max_simulations: 4,
        base_frequency: 50.0,
        base_voltage: 230.0,
        power_plants: vec![coal_plant(200.0, 100.0)],
        transmission_lines: vec![LineConfig {
            line_id: 1,
            from_node: 0,
            to_node: 1,
            capacity_mw: 100.0,
            length_km: 20.0,
            resistance_per_km: 0.05,
            reactance_per_km: 0.1,
            initially_operational: true,
        }],
        load_profile: flat_load(5_000.0),
        retention_window_s: 3600,
        max_wall_clock_s: None,
    };
    let orchestrator = Orchestrator::new(4);
    let id = orchestrator.create_simulation(config).unwrap();

    let snapshots = orchestrator.run_until(id, 1).unwrap();
    assert!(snapshots[0].active_failure_ids.contains(&1));

    // The trip is latched: it stays tripped on later ticks without any
    // further fault or repair call.
    let later = orchestrator.run_until(id, 2).unwrap();
    assert!(later[0].active_failure_ids.contains(&1));
}

/// S6 — Determinism: replaying the same config and event script twice
/// produces identical snapshot sequences.
#[test]
fn identical_config_and_events_produce_identical_snapshots() {
    let run = || {
        let config = config_with_plants(vec![coal_plant(500.0, 300.0)], flat_load(320.0), 100);
        let orchestrator = Orchestrator::new(4);
        let id = orchestrator.create_simulation(config).unwrap();
        orchestrator.run_until(id, 3).unwrap();
        orchestrator.inject_fault(id, 1, 1, FaultKind::PlantOutage).unwrap();
        orchestrator.run_until(id, 8).unwrap()
    };

    let a = run();
    let b = run();

    assert_eq!(a.len(), b.len());
    for (left, right) in a.iter().zip(b.iter()) {
        assert_eq!(left.tick_number, right.tick_number);
        assert_eq!(left.total_generation_mw, right.total_generation_mw);
        assert_eq!(left.total_consumption_mw, right.total_consumption_mw);
        assert_eq!(left.grid_frequency_hz, right.grid_frequency_hz);
        assert_eq!(left.active_failure_ids, right.active_failure_ids);
    }
}
