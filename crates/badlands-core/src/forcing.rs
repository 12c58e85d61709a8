//! Time-varying boundary forcing: sea level and point river sources.
use serde::{Deserialize, Serialize};

/// External forcing sampled at the start of every step.
pub trait Forcing {
    /// Refresh all forcing fields for time `t` (years).
    fn update(&mut self, t: f64);
    fn sea_level(&self) -> f64;
    /// River water input per node as an equivalent rainfall rate (m/yr).
    fn river_water(&self) -> &[f64];
    /// River sediment supply per node (m³/yr).
    fn river_sediment(&self) -> &[f64];
}

/// A river entering the mesh at `node` while `t_start <= t < t_end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiverSource {
    pub node: usize,
    pub t_start: f64,
    pub t_end: f64,
    /// Water discharge (m³/yr).
    pub water: f64,
    /// Sediment discharge (m³/yr).
    pub sediment: f64,
}

/// Forcing from a piecewise-linear sea-level table and a list of rivers.
#[derive(Debug, Clone)]
pub struct TabulatedForcing {
    /// `(time, sea level)` samples sorted by time.
    sea_curve: Vec<(f64, f64)>,
    rivers: Vec<RiverSource>,
    control_volumes: Vec<f64>,
    sea_level: f64,
    water: Vec<f64>,
    sediment: Vec<f64>,
}

impl TabulatedForcing {
    /// Constant sea level, no rivers.
    pub fn new(control_volumes: &[f64], sea_level: f64) -> Self {
        let n = control_volumes.len();
        Self {
            sea_curve: vec![(0.0, sea_level)],
            rivers: Vec::new(),
            control_volumes: control_volumes.to_vec(),
            sea_level,
            water: vec![0.0; n],
            sediment: vec![0.0; n],
        }
    }

    /// Replace the sea-level curve. Samples are sorted by time; an empty
    /// table keeps the current curve.
    pub fn with_sea_curve(mut self, mut points: Vec<(f64, f64)>) -> Self {
        if !points.is_empty() {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            self.sea_curve = points;
        }
        self
    }

    /// Add river sources. Sources pointing outside the mesh are dropped.
    pub fn with_rivers(mut self, rivers: impl IntoIterator<Item = RiverSource>) -> Self {
        let n = self.control_volumes.len();
        for river in rivers {
            if river.node < n {
                self.rivers.push(river);
            } else {
                log::warn!("river source at node {} is outside the mesh ({n} nodes)", river.node);
            }
        }
        self
    }

    fn sample_sea(&self, t: f64) -> f64 {
        let curve = &self.sea_curve;
        let (first, last) = (curve[0], curve[curve.len() - 1]);
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        let k = curve.partition_point(|&(tk, _)| tk <= t);
        let (t0, z0) = curve[k - 1];
        let (t1, z1) = curve[k];
        if t1 > t0 {
            z0 + (z1 - z0) * (t - t0) / (t1 - t0)
        } else {
            z1
        }
    }
}

impl Forcing for TabulatedForcing {
    fn update(&mut self, t: f64) {
        self.sea_level = self.sample_sea(t);
        self.water.iter_mut().for_each(|w| *w = 0.0);
        self.sediment.iter_mut().for_each(|s| *s = 0.0);
        for river in self.rivers.iter().filter(|r| t >= r.t_start && t < r.t_end) {
            let cv = self.control_volumes[river.node];
            if cv > 0.0 {
                self.water[river.node] += river.water / cv;
            }
            self.sediment[river.node] += river.sediment;
        }
    }

    fn sea_level(&self) -> f64 {
        self.sea_level
    }

    fn river_water(&self) -> &[f64] {
        &self.water
    }

    fn river_sediment(&self) -> &[f64] {
        &self.sediment
    }
}
