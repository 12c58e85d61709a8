//! Layered substrate and the erodibility it exposes at the surface.
//!
//! Each node carries a stack of layers above an infinitely thick bedrock.
//! Deposition adds to a top sediment layer, erosion strips layers from the
//! top, and the erodibility of whatever is exposed drives stream power.
use serde::{Deserialize, Serialize};

use crate::error::NumericalError;

/// Thickness below which a layer counts as fully stripped (m).
const MIN_THICKNESS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer thickness (m).
    pub thickness: f64,
    /// Stream-power coefficient of the layer material.
    pub erodibility: f64,
}

#[derive(Debug, Clone)]
pub struct ErodibilityMap {
    /// Per-node layer stacks, bottom first so the exposed layer is `last()`.
    columns: Vec<Vec<Layer>>,
    bedrock: f64,
    sediment: f64,
    erodibility: Vec<f64>,
}

impl ErodibilityMap {
    /// `layers` lists the initial stratigraphy top first and is applied
    /// uniformly to all `n` nodes.
    pub fn new(n: usize, layers: &[Layer], bedrock: f64, sediment: f64) -> Self {
        let column: Vec<Layer> = layers
            .iter()
            .rev()
            .filter(|l| l.thickness > MIN_THICKNESS)
            .copied()
            .collect();
        let mut map = Self {
            columns: vec![column; n],
            bedrock,
            sediment,
            erodibility: vec![bedrock; n],
        };
        for i in 0..n {
            map.erodibility[i] = map.exposed(i);
        }
        map
    }

    /// Current erodibility of every node.
    pub fn erodibility(&self) -> &[f64] {
        &self.erodibility
    }

    /// Total layer thickness above bedrock at `node`.
    pub fn thickness(&self, node: usize) -> f64 {
        self.columns[node].iter().map(|l| l.thickness).sum()
    }

    /// Apply an elevation change to the layer stacks and refresh the exposed
    /// erodibility. The change is validated in full first, so on error the
    /// map is left as it was.
    pub fn update(&mut self, change: &[f64]) -> Result<&[f64], NumericalError> {
        if change.len() != self.columns.len() {
            return Err(NumericalError::Shape {
                field: "erodibility change",
                expected: self.columns.len(),
                got: change.len(),
            });
        }
        if let Some(i) = change.iter().position(|dz| !dz.is_finite()) {
            return Err(NumericalError::NonFinite { field: "erodibility change", node: i });
        }
        for (i, &dz) in change.iter().enumerate() {
            if dz > 0.0 {
                self.deposit(i, dz);
            } else if dz < 0.0 {
                self.strip(i, -dz);
            }
            self.erodibility[i] = self.exposed(i);
        }
        Ok(&self.erodibility)
    }

    fn deposit(&mut self, node: usize, dz: f64) {
        let column = &mut self.columns[node];
        match column.last_mut() {
            Some(top) if top.erodibility == self.sediment => top.thickness += dz,
            _ => column.push(Layer { thickness: dz, erodibility: self.sediment }),
        }
    }

    fn strip(&mut self, node: usize, mut depth: f64) {
        let column = &mut self.columns[node];
        while depth > 0.0 {
            let Some(top) = column.last_mut() else {
                // Bedrock is unbounded.
                return;
            };
            if top.thickness - depth > MIN_THICKNESS {
                top.thickness -= depth;
                return;
            }
            depth -= top.thickness;
            column.pop();
        }
    }

    fn exposed(&self, node: usize) -> f64 {
        self.columns[node].last().map_or(self.bedrock, |l| l.erodibility)
    }
}
