//! Stream-power erosion, sediment routing and deposition.
//!
//! Detachment rate `E = K · Q^m · S^n` on emerged, in-domain nodes. Eroded
//! volume and river sediment travel down the raw-surface stack and are
//! trapped:
//!   - entirely on submerged nodes (then smoothed over the one-ring with
//!     Gaussian weights of width `diffsigma`);
//!   - up to the remaining accommodation inside depressions;
//!   - by a fraction `perc_dep` on flat land (`S < slp_cr`).
//!
//! The candidate timestep is shortened so no eroding node cuts below its
//! receiver.
use serde::{Deserialize, Serialize};

use crate::error::NumericalError;
use crate::flow::receivers::ReceiverGraph;
use crate::mesh::TinMesh;

/// Depth under which a node does not count as sitting in a depression.
const PIT_DEPTH: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamPower {
    /// Discharge exponent.
    pub m: f64,
    /// Slope exponent.
    pub n: f64,
}

impl Default for StreamPower {
    fn default() -> Self {
        Self { m: 0.5, n: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SedimentParams {
    pub spl: StreamPower,
    /// Fraction of incoming load deposited on flat land.
    pub perc_dep: f64,
    /// Slope below which land counts as flat.
    pub slp_cr: f64,
    /// Width of the marine-deposit smoothing kernel (m); 0 disables it.
    pub diffsigma: f64,
}

/// Fields read by [`sediment_flux`].
#[derive(Clone, Copy)]
pub struct SedimentInputs<'a> {
    pub mesh: &'a TinMesh,
    pub elevation: &'a [f64],
    pub filled: &'a [f64],
    /// Raw-surface receivers and stack.
    pub graph: &'a ReceiverGraph,
    pub stack: &'a [usize],
    pub discharge: &'a [f64],
    pub erodibility: &'a [f64],
    /// Domain mask; only `true` nodes change elevation.
    pub inside: &'a [bool],
    /// River sediment supply per node (m³/yr).
    pub river_sediment: &'a [f64],
    /// Elevation change accumulated since the start of the run. Shape-checked
    /// here; kernels limiting erosion by deposited thickness read it.
    pub cumulative: &'a [f64],
    pub sea_level: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SedimentUpdate {
    /// Achieved sub-step, never longer than the candidate.
    pub dt: f64,
    /// Elevation change accumulated over `dt`.
    pub change: Vec<f64>,
}

/// Flow stability bound: the shortest time for an erosion wave to cross the
/// distance to a receiver, `d / (K · Q^m · S^(n−1))`, over `interior` nodes.
/// Infinite when nothing erodes.
pub fn flow_cfl(
    graph: &ReceiverGraph,
    discharge: &[f64],
    erodibility: &[f64],
    interior: &[usize],
    spl: StreamPower,
) -> f64 {
    interior
        .iter()
        .filter(|&&i| graph.receivers[i] != i && graph.slope[i] > 0.0)
        .filter_map(|&i| {
            let celerity = erodibility[i] * discharge[i].powf(spl.m) * graph.slope[i].powf(spl.n - 1.0);
            (celerity > 0.0).then(|| graph.distance[i] / celerity)
        })
        .fold(f64::INFINITY, f64::min)
}

pub fn sediment_flux(
    inputs: &SedimentInputs<'_>,
    params: &SedimentParams,
    candidate_dt: f64,
) -> Result<SedimentUpdate, NumericalError> {
    let SedimentInputs {
        mesh,
        elevation,
        filled,
        graph,
        stack,
        discharge,
        erodibility,
        inside,
        river_sediment,
        cumulative,
        sea_level,
    } = *inputs;
    let n = elevation.len();
    for (field, got) in [
        ("filled", filled.len()),
        ("discharge", discharge.len()),
        ("erodibility", erodibility.len()),
        ("inside", inside.len()),
        ("river_sediment", river_sediment.len()),
        ("cumulative", cumulative.len()),
        ("receivers", graph.len()),
    ] {
        if got != n {
            return Err(NumericalError::Shape { field, expected: n, got });
        }
    }
    let cv = &mesh.control_volumes;

    // ── Detachment rates ─────────────────────────────────────────────────────
    let erosion: Vec<f64> = (0..n)
        .map(|i| {
            let r = graph.receivers[i];
            let emerged = elevation[i] > sea_level;
            let in_pit = filled[i] - elevation[i] > PIT_DEPTH;
            if mesh.is_boundary(i) || !inside[i] || !emerged || in_pit || r == i {
                return 0.0;
            }
            erodibility[i] * discharge[i].powf(params.spl.m) * graph.slope[i].powf(params.spl.n)
        })
        .collect();

    // ── Achieved sub-step ────────────────────────────────────────────────────
    let mut dt = candidate_dt;
    for (i, &e) in erosion.iter().enumerate() {
        if e > 0.0 {
            let gap = elevation[i] - elevation[graph.receivers[i]];
            dt = dt.min(gap / e);
        }
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(NumericalError::StepCollapsed {
            candidate: candidate_dt,
            achieved: dt,
        });
    }

    // ── Routing and deposition, donors first ─────────────────────────────────
    let mut load = river_sediment.iter().map(|&q| q.max(0.0)).collect::<Vec<f64>>();
    let mut deposit = vec![0.0; n];
    let mut marine = vec![false; n];
    for &i in stack.iter().rev() {
        let incoming = load[i] + erosion[i] * cv[i];
        let trapped = if mesh.is_boundary(i) {
            0.0
        } else if elevation[i] < sea_level {
            marine[i] = true;
            incoming
        } else if filled[i] - elevation[i] > PIT_DEPTH {
            incoming.min((filled[i] - elevation[i]) * cv[i] / dt)
        } else if graph.slope[i] < params.slp_cr {
            params.perc_dep * incoming
        } else {
            0.0
        };
        deposit[i] = trapped;
        let r = graph.receivers[i];
        if r != i {
            load[r] += incoming - trapped;
        }
    }

    if params.diffsigma > 0.0 {
        deposit = smooth_marine_deposits(mesh, &deposit, &marine, params.diffsigma);
    }

    let mut change = vec![0.0; n];
    for i in 0..n {
        if !inside[i] {
            continue;
        }
        let dz = (deposit[i] / cv[i] - erosion[i]) * dt;
        if !dz.is_finite() {
            return Err(NumericalError::NonFinite { field: "sediment change", node: i });
        }
        change[i] = dz;
    }

    Ok(SedimentUpdate { dt, change })
}

/// Spread each submerged node's deposit volume over itself and its submerged
/// neighbours with weights `exp(−(d/σ)²)`. Volume is conserved.
fn smooth_marine_deposits(mesh: &TinMesh, deposit: &[f64], marine: &[bool], sigma: f64) -> Vec<f64> {
    let mut out = deposit.to_vec();
    for i in 0..deposit.len() {
        if !marine[i] || deposit[i] <= 0.0 {
            continue;
        }
        let weights: Vec<(usize, f64)> = mesh
            .neighbours(i)
            .filter(|nb| marine[nb.node])
            .map(|nb| (nb.node, (-(nb.length / sigma).powi(2)).exp()))
            .collect();
        let total: f64 = 1.0 + weights.iter().map(|(_, w)| w).sum::<f64>();
        out[i] -= deposit[i] * (1.0 - 1.0 / total);
        for (j, w) in weights {
            out[j] += deposit[i] * w / total;
        }
    }
    out
}
