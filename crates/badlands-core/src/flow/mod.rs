//! Drainage network state and the kernels that build it each step:
//! fill → receivers → stacks → depressions → discharge → sediment flux.
pub mod depressions;
pub mod discharge;
pub mod fill;
pub mod receivers;
pub mod sediment;
pub mod stack;

use crate::comm::Communicator;
use crate::error::StackError;
use crate::mesh::TinMesh;
use depressions::{depression_parameters, DepressionSet};
use discharge::accumulate_discharge;
use receivers::{steepest_descent, ReceiverGraph};
use sediment::{flow_cfl, StreamPower};
use stack::global_stack;

/// Per-worker replica of the drainage network.
///
/// Two receiver graphs and stacks are kept: the filled surface controls
/// routing topology and discharge, the raw surface controls transport.
#[derive(Debug, Clone, Default)]
pub struct FlowNetwork {
    pub filled_graph: ReceiverGraph,
    pub raw_graph: ReceiverGraph,
    /// Global downstream-first order on the filled surface.
    pub stack: Vec<usize>,
    /// Global downstream-first order on the raw surface.
    pub raw_stack: Vec<usize>,
    pub depressions: DepressionSet,
    pub discharge: Vec<f64>,
    /// Stream-power erodibility `K` per node.
    pub erodibility: Vec<f64>,
}

impl FlowNetwork {
    pub fn new(n: usize, erodibility: f64) -> Self {
        Self {
            discharge: vec![0.0; n],
            erodibility: vec![erodibility; n],
            ..Self::default()
        }
    }

    /// Steepest-descent receivers on both surfaces.
    pub fn sfd_receivers(&mut self, filled: &[f64], elevation: &[f64], mesh: &TinMesh) {
        self.filled_graph = steepest_descent(filled, mesh);
        self.raw_graph = steepest_descent(elevation, mesh);
    }

    /// Global stack for the filled surface. Blocks until every worker has
    /// contributed its piece.
    pub fn build_filled_stack<C: Communicator>(&mut self, comm: &C) -> Result<(), StackError> {
        self.stack = global_stack(&self.filled_graph.receivers, &self.filled_graph.base, comm)?;
        Ok(())
    }

    /// Global stack for the raw surface.
    pub fn build_raw_stack<C: Communicator>(&mut self, comm: &C) -> Result<(), StackError> {
        self.raw_stack = global_stack(&self.raw_graph.receivers, &self.raw_graph.base, comm)?;
        Ok(())
    }

    pub fn compute_depressions(&mut self, filled: &[f64], elevation: &[f64], mesh: &TinMesh, sea_level: f64) {
        self.depressions = depression_parameters(filled, elevation, mesh, sea_level);
    }

    /// Discharge along the filled-surface stack.
    pub fn compute_flow(&mut self, control_volumes: &[f64], water: &[f64]) {
        self.discharge = accumulate_discharge(&self.stack, &self.filled_graph.receivers, control_volumes, water);
    }

    /// Flow stability bound over `interior` nodes on the filled surface.
    pub fn dt_stability(&self, interior: &[usize], spl: StreamPower) -> f64 {
        flow_cfl(&self.filled_graph, &self.discharge, &self.erodibility, interior, spl)
    }
}
