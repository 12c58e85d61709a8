//! Runs the surface-evolution engine on a synthetic regular TIN with a group
//! of in-process workers and prints a JSON summary of the final surface.
use std::fs;
use std::io::Write;
use std::thread;

use anyhow::{anyhow, Context, Result};
use badlands_core::{DomainRect, Simulation, SimulationConfig, ThreadComm, TinMesh};
use clap::Parser;
use log::LevelFilter;
use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "badlands-run", about = "Drainage routing and landscape evolution on a regular TIN")]
struct Args {
    /// Nodes along x.
    #[arg(long, default_value_t = 60)]
    nx: usize,

    /// Nodes along y.
    #[arg(long, default_value_t = 40)]
    ny: usize,

    /// Node spacing (m).
    #[arg(long, default_value_t = 100.0)]
    dx: f64,

    /// Rings of TIN nodes added around the background grid. Padding nodes lie
    /// outside the simulation domain and never change elevation.
    #[arg(long, default_value_t = 1)]
    pad: usize,

    /// Number of worker threads.
    #[arg(short, long, default_value_t = 2)]
    workers: usize,

    /// Run one worker per MPI process instead of worker threads.
    #[cfg(feature = "mpi")]
    #[arg(long)]
    mpi: bool,

    /// JSON configuration file. Defaults are used for missing options.
    #[arg(short, long)]
    config: Option<String>,

    /// End time (yr); overrides the configuration.
    #[arg(long)]
    t_end: Option<f64>,

    /// Seed for the initial surface.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Regional slope of the initial ramp (m/m).
    #[arg(long, default_value_t = 0.02)]
    slope: f64,

    /// Amplitude of the noise added to the ramp (m).
    #[arg(long, default_value_t = 20.0)]
    relief: f64,

    /// Log level (error, warn, info, debug, trace). Falls back to RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    nodes: usize,
    workers: usize,
    steps: usize,
    t_end: f64,
    sea_level: f64,
    min_elevation: f64,
    max_elevation: f64,
    mean_elevation: f64,
    eroded_volume: f64,
    deposited_volume: f64,
    depressions: usize,
    max_discharge: f64,
}

fn init_logging(level: Option<&str>) {
    let filter = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(filter)
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();
}

/// Rectangle of the `nx × ny` background grid inside a TIN padded by `pad`
/// rings of nodes.
fn background_domain(nx: usize, ny: usize, pad: usize, dx: f64) -> Option<DomainRect> {
    let reg_x: Vec<f64> = (pad..pad + nx).map(|c| c as f64 * dx).collect();
    let reg_y: Vec<f64> = (pad..pad + ny).map(|r| r as f64 * dx).collect();
    DomainRect::from_grid(&reg_x, &reg_y)
}

/// Ramp falling towards x = 0, perturbed by Perlin noise and a small jitter
/// so no two nodes share an elevation.
fn initial_surface(mesh: &TinMesh, args: &Args) -> Vec<f64> {
    let perlin = Perlin::new((args.seed & 0xFFFF_FFFF) as u32);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let freq = 4.0 / (args.nx.max(args.ny) as f64 * args.dx);
    mesh.coords
        .iter()
        .map(|&[x, y]| {
            let n = perlin.get([x * freq, y * freq]);
            args.slope * x + args.relief * (0.5 * n + 0.5) + rng.gen_range(0.0..1e-3)
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            SimulationConfig::from_json_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => SimulationConfig::default(),
    };
    if let Some(t_end) = args.t_end {
        config.t_end = t_end;
    }
    config.validate().context("invalid configuration")?;

    let mesh = TinMesh::regular_grid(args.nx + 2 * args.pad, args.ny + 2 * args.pad, args.dx)
        .context("building mesh")?;
    let domain = background_domain(args.nx, args.ny, args.pad, args.dx).context("background grid is empty")?;
    let elevation = initial_surface(&mesh, &args);
    let initial_volume: f64 = elevation.iter().zip(&mesh.control_volumes).map(|(z, cv)| z * cv).sum();
    #[cfg(feature = "mpi")]
    if args.mpi {
        return run_mpi(mesh, elevation, config, domain, initial_volume);
    }

    let workers = args.workers.max(1);
    log::info!(
        "{} nodes ({} boundary), {workers} workers, t = {} → {} yr",
        mesh.len(),
        mesh.bound_pts,
        config.t_start,
        config.t_end
    );

    let handles: Vec<_> = ThreadComm::group(workers)
        .into_iter()
        .map(|comm| {
            let mesh = mesh.clone();
            let elevation = elevation.clone();
            let config = config.clone();
            thread::spawn(move || -> Result<Option<Summary>> {
                let t_end = config.t_end;
                let forcing = config.forcing(&mesh.control_volumes);
                let mut sim = Simulation::new(mesh, elevation, config, domain, forcing, comm)?;
                sim.initialize()?;
                let steps = sim.run_until(t_end)?;
                if sim.rank() != 0 {
                    return Ok(None);
                }
                Ok(Some(summarize(&sim, steps, workers, initial_volume)))
            })
        })
        .collect();

    let mut summary = None;
    for (rank, handle) in handles.into_iter().enumerate() {
        let result = handle.join().map_err(|_| anyhow!("worker {rank} panicked"))?;
        if let Some(s) = result.with_context(|| format!("worker {rank} failed"))? {
            summary = Some(s);
        }
    }
    let summary = summary.ok_or_else(|| anyhow!("rank 0 produced no summary"))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// One worker per MPI process; rank 0 prints the summary.
#[cfg(feature = "mpi")]
fn run_mpi(mesh: TinMesh, elevation: Vec<f64>, config: SimulationConfig, domain: DomainRect, initial_volume: f64) -> Result<()> {
    use badlands_core::{Communicator, MpiComm};

    let universe = mpi::initialize().ok_or_else(|| anyhow!("MPI already initialised"))?;
    let comm = MpiComm::new(universe.world());
    let workers = comm.size();
    if comm.rank() == 0 {
        log::info!("{} nodes ({} boundary), {workers} MPI ranks", mesh.len(), mesh.bound_pts);
    }
    let t_end = config.t_end;
    let forcing = config.forcing(&mesh.control_volumes);
    let mut sim = Simulation::new(mesh, elevation, config, domain, forcing, comm)?;
    sim.initialize()?;
    let steps = sim.run_until(t_end)?;
    if sim.rank() == 0 {
        let summary = summarize(&sim, steps, workers, initial_volume);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn summarize<C, F>(sim: &Simulation<C, F>, steps: usize, workers: usize, initial_volume: f64) -> Summary
where
    C: badlands_core::Communicator,
    F: badlands_core::Forcing,
{
    let z = sim.elevation();
    let cv = &sim.mesh().control_volumes;
    let (mut eroded, mut deposited) = (0.0, 0.0);
    for (&dz, &a) in sim.cumulative_change().iter().zip(cv) {
        if dz < 0.0 {
            eroded -= dz * a;
        } else {
            deposited += dz * a;
        }
    }
    let volume: f64 = z.iter().zip(cv).map(|(z, a)| z * a).sum();
    log::debug!("net volume change {:.3e} m³", volume - initial_volume);
    Summary {
        nodes: z.len(),
        workers,
        steps,
        t_end: sim.t_now(),
        sea_level: sim.sea_level(),
        min_elevation: z.iter().copied().fold(f64::INFINITY, f64::min),
        max_elevation: z.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_elevation: z.iter().sum::<f64>() / z.len() as f64,
        eroded_volume: eroded,
        deposited_volume: deposited,
        depressions: sim.flow().depressions.pits.len(),
        max_discharge: sim.flow().discharge.iter().copied().fold(0.0, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_ring_lies_outside_the_domain() {
        let (nx, ny, pad) = (6, 4, 1);
        let mesh = TinMesh::regular_grid(nx + 2 * pad, ny + 2 * pad, 50.0).unwrap();
        let domain = background_domain(nx, ny, pad, 50.0).unwrap();
        assert_eq!(domain.min, [50.0, 50.0]);
        assert_eq!(domain.max, [300.0, 200.0]);
        let inside = domain.mask(&mesh.coords).iter().filter(|&&m| m).count();
        assert_eq!(inside, nx * ny);
        // With one ring the padding is exactly the mesh boundary.
        for (i, &m) in domain.mask(&mesh.coords).iter().enumerate() {
            assert_eq!(m, !mesh.is_boundary(i), "node {i}");
        }
    }

    #[test]
    fn empty_grid_has_no_domain() {
        assert!(background_domain(0, 4, 1, 10.0).is_none());
    }
}
