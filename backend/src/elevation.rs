use petgraph::graph::EdgeIndex;

use crate::network::RoadNetwork;

/// Cumulative ascent and descent along a path, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElevationProfile {
    pub gain_m: f64,
    pub loss_m: f64,
}

impl ElevationProfile {
    /// Sums signed per-segment deltas; descents never count toward gain.
    pub fn from_deltas(deltas: impl IntoIterator<Item = f64>) -> Self {
        deltas
            .into_iter()
            .fold(Self::default(), |profile, delta| profile.with_delta(delta))
    }

    pub fn of_path<N: RoadNetwork>(network: &N, edges: &[EdgeIndex]) -> Self {
        Self::from_deltas(
            edges
                .iter()
                .map(|&edge| network.edge(edge).elevation_delta_m),
        )
    }

    /// The same physical path ridden the other way.
    pub fn reversed(self) -> Self {
        Self {
            gain_m: self.loss_m,
            loss_m: self.gain_m,
        }
    }

    pub fn total_change_m(&self) -> f64 {
        self.gain_m + self.loss_m
    }

    fn with_delta(self, delta: f64) -> Self {
        Self {
            gain_m: self.gain_m + ascent(delta),
            loss_m: self.loss_m + ascent(-delta),
        }
    }
}

/// Positive part of a signed elevation delta.
pub fn ascent(delta_m: f64) -> f64 {
    if delta_m.is_finite() {
        delta_m.max(0.0)
    } else {
        0.0
    }
}
