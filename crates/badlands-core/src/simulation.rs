//! Per-worker simulation driver.
//!
//! Every worker owns a full replica of the mesh fields and runs the same
//! sequence each step; the two global stack builds are the only points where
//! workers exchange data. Because the gathered stacks are identical everywhere,
//! every replica stays bit-for-bit identical.
//!
//! ```text
//! streamflow:    forcing → fill → receivers → filled stack → raw stack
//!                → depressions → discharge
//! sediment_flux: timestep → domain mask → stream power → hillslope
//!                → displacement → erodibility → advance time
//! ```
use std::time::Instant;

use crate::boundary::{resolve_boundary_elevation, BoundaryCondition};
use crate::comm::Communicator;
use crate::config::SimulationConfig;
use crate::domain::{apply_mask, DomainRect};
use crate::erodibility::ErodibilityMap;
use crate::error::{EngineError, MeshError, NumericalError, Stage};
use crate::flow::fill::fill_depressions;
use crate::flow::sediment::{sediment_flux, SedimentInputs};
use crate::flow::FlowNetwork;
use crate::forcing::Forcing;
use crate::hillslope::{diffusion_flux, Hillslope};
use crate::mesh::TinMesh;
use crate::stability::adaptive_timestep;

pub struct Simulation<C: Communicator, F: Forcing> {
    mesh: TinMesh,
    config: SimulationConfig,
    boundary: BoundaryCondition,
    domain: DomainRect,
    /// Non-boundary nodes inside the domain; the stability bounds scan these.
    interior: Vec<usize>,
    elevation: Vec<f64>,
    cumdiff: Vec<f64>,
    filled: Vec<f64>,
    rain: Vec<f64>,
    water: Vec<f64>,
    flow: FlowNetwork,
    hillslope: Option<Hillslope>,
    erodibility: Option<ErodibilityMap>,
    forcing: F,
    comm: C,
    t_now: f64,
}

impl<C: Communicator, F: Forcing> Simulation<C, F> {
    pub fn new(
        mesh: TinMesh,
        elevation: Vec<f64>,
        config: SimulationConfig,
        domain: DomainRect,
        forcing: F,
        comm: C,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let n = mesh.len();
        if elevation.len() != n {
            return Err(MeshError::Shape { field: "elevation", expected: n, got: elevation.len() }.into());
        }
        let boundary = config.boundary_condition()?;
        let interior: Vec<usize> = mesh
            .interior_nodes()
            .into_iter()
            .filter(|&i| domain.contains(mesh.coords[i]))
            .collect();

        let erodibility = (config.erolays >= 0).then(|| {
            let layers: Vec<_> = config.erosion_layers.iter().take(config.erolays as usize).copied().collect();
            ErodibilityMap::new(n, &layers, config.erodibility, config.sed_erodibility)
        });
        let mut flow = FlowNetwork::new(n, config.erodibility);
        if let Some(map) = &erodibility {
            flow.erodibility = map.erodibility().to_vec();
        }
        let hillslope = config.hillslope.then(|| config.hillslope_params());

        Ok(Self {
            rain: vec![config.rain; n],
            water: vec![config.rain; n],
            cumdiff: vec![0.0; n],
            filled: elevation.clone(),
            t_now: config.t_start,
            mesh,
            config,
            boundary,
            domain,
            interior,
            elevation,
            flow,
            hillslope,
            erodibility,
            forcing,
            comm,
        })
    }

    pub fn mesh(&self) -> &TinMesh {
        &self.mesh
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn t_now(&self) -> f64 {
        self.t_now
    }

    pub fn elevation(&self) -> &[f64] {
        &self.elevation
    }

    /// Running sum of sediment and diffusion change since the start.
    pub fn cumulative_change(&self) -> &[f64] {
        &self.cumdiff
    }

    /// Filled surface from the latest `streamflow` call.
    pub fn filled(&self) -> &[f64] {
        &self.filled
    }

    pub fn flow(&self) -> &FlowNetwork {
        &self.flow
    }

    pub fn erodibility_map(&self) -> Option<&ErodibilityMap> {
        self.erodibility.as_ref()
    }

    pub fn sea_level(&self) -> f64 {
        self.forcing.sea_level()
    }

    /// Apply the configured boundary condition to the elevation field.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        resolve_boundary_elevation(&mut self.elevation, &self.mesh, self.boundary)
            .map_err(|e| EngineError::at(Stage::Boundary, self.comm.rank(), e))
    }

    /// Build the drainage network for the current surface.
    pub fn streamflow(&mut self) -> Result<(), EngineError> {
        let rank = self.comm.rank();
        let timer = Timer::new(rank == 0);

        self.forcing.update(self.t_now);
        let sea_level = self.forcing.sea_level();
        for ((w, &r), &q) in self.water.iter_mut().zip(&self.rain).zip(self.forcing.river_water()) {
            *w = r + q;
        }

        let fill = self.config.fill_params();
        if self.t_now == self.config.t_start && self.config.nopit {
            self.filled = fill_depressions(&self.elevation, &self.mesh, &fill, true, sea_level);
            self.elevation.clone_from(&self.filled);
        } else {
            self.filled = fill_depressions(&self.elevation, &self.mesh, &fill, false, sea_level);
        }
        timer.lap(Stage::Fill);

        self.flow.sfd_receivers(&self.filled, &self.elevation, &self.mesh);
        timer.lap(Stage::Receivers);

        self.flow
            .build_filled_stack(&self.comm)
            .map_err(|e| EngineError::at(Stage::FilledStack, rank, e))?;
        timer.lap(Stage::FilledStack);
        self.flow
            .build_raw_stack(&self.comm)
            .map_err(|e| EngineError::at(Stage::RawStack, rank, e))?;
        timer.lap(Stage::RawStack);

        self.flow.compute_depressions(&self.filled, &self.elevation, &self.mesh, sea_level);
        self.flow.compute_flow(&self.mesh.control_volumes, &self.water);
        timer.lap(Stage::Discharge);
        Ok(())
    }

    /// Advance the surface by one stable timestep towards `t_end`. Returns the
    /// step taken.
    ///
    /// All changes are staged in scratch buffers and committed only once every
    /// stage has succeeded; on error the fields and `t_now` are untouched.
    pub fn sediment_flux(&mut self, t_end: f64, displacement: Option<&[f64]>) -> Result<f64, EngineError> {
        let rank = self.comm.rank();
        let timer = Timer::new(rank == 0);
        let n = self.mesh.len();
        if let Some(disp) = displacement {
            if disp.len() != n {
                let err = NumericalError::Shape { field: "displacement", expected: n, got: disp.len() };
                return Err(EngineError::at(Stage::Displacement, rank, err));
            }
        }

        // ── Timestep ────────────────────────────────────────────────────────
        let hillslope_cfl = match &self.hillslope {
            Some(h) => h.dt_stability(&self.mesh, &self.interior),
            None => t_end - self.t_now,
        };
        let flow_cfl = self.flow.dt_stability(&self.interior, self.config.stream_power());
        let candidate = adaptive_timestep(
            hillslope_cfl,
            flow_cfl,
            self.t_now,
            t_end,
            self.config.min_dt,
            self.config.max_dt,
        )
        .map_err(|e| EngineError::at(Stage::Timestep, rank, e))?;
        if rank == 0 {
            log::debug!("stability: hillslope {hillslope_cfl:.3}, flow {flow_cfl:.3}, step {candidate}");
        }
        timer.lap(Stage::Timestep);

        // ── Stream power ────────────────────────────────────────────────────
        let inside = self.domain.mask(&self.mesh.coords);
        let sea_level = self.forcing.sea_level();
        let inputs = SedimentInputs {
            mesh: &self.mesh,
            elevation: &self.elevation,
            filled: &self.filled,
            graph: &self.flow.raw_graph,
            stack: &self.flow.raw_stack,
            discharge: &self.flow.discharge,
            erodibility: &self.flow.erodibility,
            inside: &inside,
            river_sediment: self.forcing.river_sediment(),
            cumulative: &self.cumdiff,
            sea_level,
        };
        let update = sediment_flux(&inputs, &self.config.sediment_params(), candidate)
            .map_err(|e| EngineError::at(Stage::SedimentFlux, rank, e))?;
        let dt = update.dt;
        let mut next: Vec<f64> = self.elevation.iter().zip(&update.change).map(|(z, dz)| z + dz).collect();
        timer.lap(Stage::SedimentFlux);

        // ── Hillslope ───────────────────────────────────────────────────────
        let mut diff = vec![0.0; n];
        if let Some(h) = &self.hillslope {
            let flux = diffusion_flux(&next, &self.mesh, &self.mesh.interior_nodes());
            diff = h.sediment_rate(&flux, sea_level, &next, &self.mesh.control_volumes);
            apply_mask(&mut diff, &inside);
            for (i, d) in diff.iter_mut().enumerate() {
                *d *= dt;
                if !d.is_finite() {
                    let err = NumericalError::NonFinite { field: "hillslope change", node: i };
                    return Err(EngineError::at(Stage::Hillslope, rank, err));
                }
            }
        }
        timer.lap(Stage::Hillslope);

        // Last fallible stage; the map validates before it mutates.
        if let Some(map) = &mut self.erodibility {
            let k = map.update(&diff).map_err(|e| EngineError::at(Stage::Erodibility, rank, e))?;
            self.flow.erodibility.copy_from_slice(k);
            timer.lap(Stage::Erodibility);
        }

        // ── Commit ──────────────────────────────────────────────────────────
        for (i, (z, c)) in next.iter_mut().zip(self.cumdiff.iter_mut()).enumerate() {
            *z += diff[i];
            *c += update.change[i];
            *c += diff[i];
        }
        if let Some(disp) = displacement {
            for (z, d) in next.iter_mut().zip(disp) {
                *z += d * dt;
            }
        }
        self.elevation = next;
        self.t_now += dt;
        Ok(dt)
    }

    /// One full step: [`streamflow`](Self::streamflow) then
    /// [`sediment_flux`](Self::sediment_flux).
    pub fn step(&mut self, t_end: f64, displacement: Option<&[f64]>) -> Result<f64, EngineError> {
        self.streamflow()?;
        let dt = self.sediment_flux(t_end, displacement)?;
        if self.comm.rank() == 0 {
            log::info!(
                "t = {:.2} yr (dt {dt:.2}), sea level {:.2} m, {} depressions",
                self.t_now,
                self.forcing.sea_level(),
                self.flow.depressions.pits.len()
            );
        }
        Ok(dt)
    }

    /// Step until `t_end`; returns the number of steps taken.
    pub fn run_until(&mut self, t_end: f64) -> Result<usize, EngineError> {
        let mut steps = 0;
        while self.t_now < t_end {
            self.step(t_end, None)?;
            steps += 1;
        }
        Ok(steps)
    }
}

/// Stage timings, reported on rank 0 only.
struct Timer {
    enabled: bool,
    last: std::cell::Cell<Instant>,
}

impl Timer {
    fn new(enabled: bool) -> Self {
        Self { enabled, last: std::cell::Cell::new(Instant::now()) }
    }

    fn lap(&self, stage: Stage) {
        if self.enabled {
            let now = Instant::now();
            log::debug!(" - {stage}: {:.3} ms", (now - self.last.get()).as_secs_f64() * 1e3);
            self.last.set(now);
        }
    }
}
