//! Demand model (`spec.md` §4.3 "LoadModel").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rng::component_stream;

/// A fixed pseudo-component id used to seed the load model's own
/// deterministic stream, distinct from any plant or line id.
const LOAD_STREAM_COMPONENT_ID: u64 = u64::MAX;

/// Configuration for the aggregate system demand curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadProfile {
    pub base_load_mw: f64,
    pub daily_variation: f64,
    pub random_variation: f64,
}

impl LoadProfile {
    /// Computes total system demand at `simulation_time`, per §4.3:
    /// `base_load * (1 + daily_variation * sin(2π·t/86400)) + noise`, where
    /// `noise` is a deterministic per-tick draw scaled by `random_variation`.
    pub fn demand_mw(&self, simulation_id: u64, tick_number: u64, simulation_time: Duration) -> f64 {
        let seconds_in_day = simulation_time.as_secs_f64() % 86_400.0;
        let daily = 1.0
            + self.daily_variation * (2.0 * std::f64::consts::PI * seconds_in_day / 86_400.0).sin();
        let mut rng = component_stream(simulation_id, LOAD_STREAM_COMPONENT_ID, tick_number);
        // Map [0, 1) to [-1, 1) so noise is symmetric around the daily curve.
        let noise = rng.next_f64() * 2.0 - 1.0;
        let demand = self.base_load_mw * daily + self.base_load_mw * self.random_variation * noise;
        if demand.is_finite() {
            demand.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> LoadProfile {
        LoadProfile {
            base_load_mw: 1000.0,
            daily_variation: 0.2,
            random_variation: 0.05,
        }
    }

    #[test]
    fn demand_is_deterministic_for_same_inputs() {
        let p = profile();
        let a = p.demand_mw(1, 42, Duration::from_secs(3600));
        let b = p.demand_mw(1, 42, Duration::from_secs(3600));
        assert_eq!(a, b);
    }

    #[test]
    fn demand_is_never_negative_or_non_finite() {
        let p = LoadProfile {
            base_load_mw: 10.0,
            daily_variation: 5.0,
            random_variation: 5.0,
        };
        for t in 0..200u64 {
            let d = p.demand_mw(1, t, Duration::from_secs(t * 600));
            assert!(d.is_finite());
            assert!(d >= 0.0);
        }
    }

    #[test]
    fn demand_varies_across_the_day() {
        let p = profile();
        let noon = p.demand_mw(1, 1, Duration::from_secs(12 * 3600));
        let midnight = p.demand_mw(1, 1, Duration::from_secs(0));
        assert_ne!(noon, midnight);
    }
}
