//! Drainage routing and surface evolution on a triangulated irregular network.
//!
//! Each timestep builds a depression-aware drainage network (filling,
//! steepest-descent receivers, a stack gathered across all workers, discharge)
//! and then advances the surface by stream-power erosion, sediment deposition
//! and hillslope diffusion under an adaptive, stability-limited timestep.
pub mod boundary;
pub mod comm;
pub mod config;
pub mod domain;
pub mod erodibility;
pub mod error;
pub mod flow;
pub mod forcing;
pub mod hillslope;
pub mod mesh;
pub mod simulation;
pub mod stability;

pub use boundary::BoundaryCondition;
pub use comm::{Communicator, SerialComm, ThreadComm};
#[cfg(feature = "mpi")]
pub use comm::MpiComm;
pub use config::SimulationConfig;
pub use domain::DomainRect;
pub use error::{EngineError, Stage};
pub use forcing::{Forcing, RiverSource, TabulatedForcing};
pub use mesh::TinMesh;
pub use simulation::Simulation;
