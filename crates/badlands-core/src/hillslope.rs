//! Linear hillslope diffusion on the TIN finite-volume mesh.
//!
//! Net flux into node `i` is `Σ_j vor_ij · (z_j − z_i) / len_ij`; dividing by
//! the control volume and scaling by the aerial or marine diffusivity gives a
//! rate of elevation change (m/yr).
#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mesh::TinMesh;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hillslope {
    /// Diffusivity above sea level (m²/yr).
    pub cdiff_aerial: f64,
    /// Diffusivity below sea level (m²/yr).
    pub cdiff_marine: f64,
}

impl Hillslope {
    /// Explicit stability bound `min(len²) / (4 · max κ)` over the neighbour
    /// slots of `interior` nodes. Infinite without diffusion.
    pub fn dt_stability(&self, mesh: &TinMesh, interior: &[usize]) -> f64 {
        let kappa = self.cdiff_aerial.max(self.cdiff_marine);
        if kappa <= 0.0 {
            return f64::INFINITY;
        }
        let min_len = interior
            .iter()
            .flat_map(|&i| mesh.edge_lengths(i).iter().copied())
            .filter(|&l| l > 0.0)
            .fold(f64::INFINITY, f64::min);
        min_len * min_len / (4.0 * kappa)
    }

    /// Rate of elevation change from a raw flux field (see [`diffusion_flux`]).
    pub fn sediment_rate(&self, flux: &[f64], sea_level: f64, elevation: &[f64], control_volumes: &[f64]) -> Vec<f64> {
        flux.iter()
            .zip(elevation)
            .zip(control_volumes)
            .map(|((&f, &z), &cv)| {
                let kappa = if z >= sea_level { self.cdiff_aerial } else { self.cdiff_marine };
                if cv > 0.0 { kappa * f / cv } else { 0.0 }
            })
            .collect()
    }
}

/// Net diffusive exchange of every node listed in `interior`; 0 elsewhere.
pub fn diffusion_flux(elevation: &[f64], mesh: &TinMesh, interior: &[usize]) -> Vec<f64> {
    let node_flux = |i: usize| -> f64 {
        mesh.neighbours(i)
            .filter(|nb| nb.length > 0.0)
            .map(|nb| nb.vor * (elevation[nb.node] - elevation[i]) / nb.length)
            .sum()
    };

    #[cfg(feature = "threading")]
    let values: Vec<f64> = interior.par_iter().map(|&i| node_flux(i)).collect();
    #[cfg(not(feature = "threading"))]
    let values: Vec<f64> = interior.iter().map(|&i| node_flux(i)).collect();

    let mut flux = vec![0.0; elevation.len()];
    for (&i, v) in interior.iter().zip(values) {
        flux[i] = v;
    }
    flux
}
