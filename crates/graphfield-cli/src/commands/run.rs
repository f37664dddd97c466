//! `gf run` - simulate a graph file and write the resulting layout.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{info, warn};

use graphfield_layout::{
    GraphData, Simulation, SimulationBackend, SimulationConfig, SimulationEvent,
};

/// Where the simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Cpu,
    Gpu,
}

/// Options of one `gf run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub graph: PathBuf,
    pub output: Option<PathBuf>,
    pub max_ticks: u64,
    pub alpha: f32,
    pub backend: Backend,
}

/// The layout written by `gf run`.
#[derive(Debug, Serialize)]
pub struct LayoutOutput {
    pub ticks: u64,
    pub alpha: f32,
    pub settled: bool,
    pub space_size: f32,
    pub positions: Vec<[f32; 2]>,
}

/// Read a graph file, placing points randomly when it carries no positions.
pub fn load_graph(path: &Path, config: &SimulationConfig) -> Result<GraphData> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph from {}", path.display()))?;
    let mut graph: GraphData = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse graph file {}", path.display()))?;
    graph.place_missing(config.validated().space_size, config.random_seed);
    Ok(graph)
}

/// Execute the run command.
pub fn execute(config: SimulationConfig, options: &RunOptions) -> Result<LayoutOutput> {
    let graph = load_graph(&options.graph, &config)?;
    info!(
        "loaded {} points and {} links from {}",
        graph.point_count(),
        graph.link_count(),
        options.graph.display()
    );

    let output = match options.backend {
        Backend::Cpu => simulate(Simulation::cpu(config), graph, options)?,
        Backend::Gpu => simulate(
            Simulation::gpu_blocking(config).context("Failed to initialize GPU backend")?,
            graph,
            options,
        )?,
    };

    let json = serde_json::to_string_pretty(&output)?;
    match &options.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write layout to {}", path.display()))?;
            eprintln!("💾 Layout saved to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(output)
}

fn simulate<B: SimulationBackend>(
    mut sim: Simulation<B>,
    graph: GraphData,
    options: &RunOptions,
) -> Result<LayoutOutput> {
    sim.set_graph(graph).context("Invalid graph")?;
    sim.start(options.alpha);

    let started = Instant::now();
    let mut ticks = 0;
    let mut idle = false;
    while sim.is_running() && ticks < options.max_ticks {
        if sim.frame() {
            ticks += 1;
        } else if sim.is_running() {
            // Gated frame: nothing will ever tick in a batch run.
            warn!("simulation is disabled, writing positions unchanged");
            idle = true;
            break;
        }
        for event in sim.drain_events() {
            if let SimulationEvent::Tick { alpha, progress } = event {
                tracing::debug!("tick {}: alpha {:.4}, progress {:.3}", ticks, alpha, progress);
            }
        }
    }
    let settled = !sim.is_running();
    info!(
        "{} ticks in {:.2?} ({})",
        ticks,
        started.elapsed(),
        if settled {
            "settled"
        } else if idle {
            "disabled"
        } else {
            "tick limit reached"
        }
    );

    let positions = sim
        .positions()
        .context("Failed to read back positions")?
        .into_iter()
        .map(|p| [p.x, p.y])
        .collect();
    Ok(LayoutOutput {
        ticks,
        alpha: sim.alpha(),
        settled,
        space_size: sim.space_size(),
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_settles_small_graph() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        let graph = GraphData::new(vec![100.0, 100.0, 120.0, 100.0, 110.0, 120.0], vec![0, 1, 1, 2]);
        std::fs::write(&graph_path, serde_json::to_string(&graph).unwrap()).unwrap();

        let config = SimulationConfig {
            space_size: 256.0,
            decay: 50.0,
            ..Default::default()
        };
        let options = RunOptions {
            graph: graph_path,
            output: Some(dir.path().join("layout.json")),
            max_ticks: 1000,
            alpha: 1.0,
            backend: Backend::Cpu,
        };
        let output = execute(config, &options).unwrap();
        assert!(output.settled);
        assert_eq!(output.positions.len(), 3);
        assert!(dir.path().join("layout.json").exists());
    }

    #[test]
    fn test_disabled_simulation_returns_unchanged_layout() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        let graph = GraphData::new(vec![10.0, 20.0, 30.0, 40.0], vec![0, 1]);
        std::fs::write(&graph_path, serde_json::to_string(&graph).unwrap()).unwrap();

        let config = SimulationConfig {
            enable_simulation: false,
            space_size: 256.0,
            ..Default::default()
        };
        let options = RunOptions {
            graph: graph_path,
            output: Some(dir.path().join("layout.json")),
            max_ticks: 100,
            alpha: 1.0,
            backend: Backend::Cpu,
        };

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(execute(config, &options).map_err(|e| e.to_string()));
        });
        let output = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("run did not return")
            .unwrap();

        assert_eq!(output.ticks, 0);
        assert!(!output.settled);
        assert_eq!(output.positions, vec![[10.0, 20.0], [30.0, 40.0]]);
    }

    #[test]
    fn test_graph_without_positions_is_placed() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        std::fs::write(&graph_path, r#"{"links": [0, 1, 1, 2]}"#).unwrap();
        let graph = load_graph(&graph_path, &SimulationConfig::default()).unwrap();
        assert_eq!(graph.point_count(), 3);
    }
}
