//! Error types for the time-step engine.
//!
//! Every failure here is fatal for the current run: there are no retries, and a
//! skipped step would leave stack and discharge state inconsistent.
use std::fmt;

use thiserror::Error;

/// Mesh arrays that do not describe a consistent TIN.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    #[error("mesh has no nodes")]
    Empty,
    #[error("{field} has length {got}, expected {expected}")]
    Shape {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("boundary count {bound_pts} exceeds node count {nodes}")]
    BoundaryCount { bound_pts: usize, nodes: usize },
    #[error("node {node} lists neighbour {neighbour} outside the mesh")]
    NeighbourOutOfRange { node: usize, neighbour: i64 },
}

/// Boundary-elevation resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundaryError {
    #[error("no resolved neighbour to take boundary elevation from for node {node}")]
    Unresolved { node: usize },
    #[error("unknown boundary type '{0}'")]
    UnknownType(String),
}

/// Collective-communication failures. All workers observe the same failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    #[error("rank {rank} supplied {got} entries, expected {expected}")]
    LengthMismatch {
        rank: usize,
        expected: usize,
        got: usize,
    },
    #[error("{got} segment counts supplied for {expected} workers")]
    CountMismatch { expected: usize, got: usize },
    #[error("rank {rank} did not contribute to the collective")]
    MissingContribution { rank: usize },
    #[error("worker group state poisoned by a panicking worker")]
    Poisoned,
    #[error("segment of {count} entries exceeds the message-passing count range")]
    CountOverflow { count: usize },
}

/// Global stack construction failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackError {
    #[error(transparent)]
    Comm(#[from] CommError),
    #[error("global stack holds {got} nodes, mesh has {expected}")]
    Incomplete { expected: usize, got: usize },
}

/// Domain errors reported by the numerical kernels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error("invalid timestep {dt} (t_now={t_now}, t_end={t_end})")]
    InvalidTimestep { dt: f64, t_now: f64, t_end: f64 },
    #[error("sediment sub-step collapsed to {achieved} (candidate {candidate})")]
    StepCollapsed { candidate: f64, achieved: f64 },
    #[error("non-finite value in {field} at node {node}")]
    NonFinite { field: &'static str, node: usize },
    #[error("{field} has length {got}, expected {expected}")]
    Shape {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Invalid simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("minDT ({min_dt}) must be positive and not exceed maxDT ({max_dt})")]
    TimestepClamp { min_dt: f64, max_dt: f64 },
    #[error("{name} must be {expected}, got {value}")]
    Parameter {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Stage of the per-step sequence, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Boundary,
    Fill,
    Receivers,
    FilledStack,
    RawStack,
    Discharge,
    Timestep,
    SedimentFlux,
    Hillslope,
    Displacement,
    Erodibility,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Boundary => "boundary elevation",
            Stage::Fill => "depression filling",
            Stage::Receivers => "receiver computation",
            Stage::FilledStack => "filled-surface stack",
            Stage::RawStack => "raw-surface stack",
            Stage::Discharge => "discharge accumulation",
            Stage::Timestep => "timestep estimation",
            Stage::SedimentFlux => "sediment flux",
            Stage::Hillslope => "hillslope diffusion",
            Stage::Displacement => "displacement",
            Stage::Erodibility => "erodibility update",
        };
        f.write_str(name)
    }
}

/// Source of a stage failure.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

/// Error surfaced by the simulation driver: failing stage plus worker rank.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{stage} failed on rank {rank}: {source}")]
    Stage {
        stage: Stage,
        rank: usize,
        #[source]
        source: StageFailure,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl EngineError {
    pub(crate) fn at(stage: Stage, rank: usize, source: impl Into<StageFailure>) -> Self {
        EngineError::Stage {
            stage,
            rank,
            source: source.into(),
        }
    }

    /// Stage that failed, if the error came from the step sequence.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
