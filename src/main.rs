use std::f32::consts::PI;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use atlas_layout::{Algorithm, CpuSubstrate, Edge, EngineConfig, LayoutEngine, Topology};

/// Force-directed graph layout (ForceAtlas2) from the command line.
#[derive(Parser)]
#[command(name = "atlas-layout")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out a graph and write the final positions as JSON
    Run {
        /// Graph file (.json) with positions or a node count, and edges
        #[arg(short, long)]
        graph: PathBuf,

        /// Engine configuration (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Physics options as a JSON object file
        #[arg(short, long)]
        physics: Option<PathBuf>,

        /// Number of simulation steps
        #[arg(short, long, default_value = "100")]
        steps: u32,

        /// Layout algorithm (forceatlas2 or forceatlas)
        #[arg(short, long, default_value = "forceatlas2")]
        algorithm: Algorithm,

        /// Output file; positions go to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Graph input file
#[derive(Debug, Deserialize)]
struct GraphFile {
    #[serde(default)]
    positions: Option<Vec<[f32; 2]>>,
    #[serde(default)]
    nodes: Option<usize>,
    #[serde(default)]
    edges: Vec<[u32; 2]>,
    #[serde(default)]
    weights: Option<Vec<f32>>,
}

impl GraphFile {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read graph {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid graph {}", path.display()))
    }

    /// Starting positions: the given ones, or a spiral seed over `nodes`
    fn initial_positions(&self, dimensions: [f32; 2]) -> anyhow::Result<Vec<[f32; 2]>> {
        match (&self.positions, self.nodes) {
            (Some(positions), Some(n)) if positions.len() != n => bail!(
                "graph gives {} positions but declares {n} nodes",
                positions.len()
            ),
            (Some(positions), _) => Ok(positions.clone()),
            (None, Some(n)) => Ok(spiral(n, dimensions)),
            (None, None) => bail!("graph needs either \"positions\" or \"nodes\""),
        }
    }

    fn topology(&self, num_points: usize) -> anyhow::Result<Topology> {
        let edges: Vec<Edge> = self.edges.iter().map(|&[s, t]| Edge::new(s, t)).collect();
        let topology = match &self.weights {
            Some(weights) => Topology::with_weights(num_points, &edges, weights)?,
            None => Topology::new(num_points, &edges)?,
        };
        Ok(topology)
    }
}

/// Deterministic golden-angle spiral inside the layout area
fn spiral(n: usize, dimensions: [f32; 2]) -> Vec<[f32; 2]> {
    let golden = PI * (3.0 - 5f32.sqrt());
    let [w, h] = dimensions;
    (0..n)
        .map(|i| {
            let r = 0.45 * ((i as f32 + 0.5) / n as f32).sqrt();
            let theta = i as f32 * golden;
            [w * (0.5 + r * theta.cos()), h * (0.5 + r * theta.sin())]
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct LayoutOutput<'a> {
    algorithm: &'a str,
    steps: u64,
    positions: Vec<[f32; 2]>,
}

fn run(
    graph: &Path,
    config: Option<&Path>,
    physics: Option<&Path>,
    steps: u32,
    algorithm: Algorithm,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let graph = GraphFile::load(graph)?;
    let positions = graph.initial_positions(config.dimensions)?;
    let topology = graph.topology(positions.len())?;

    let mut engine = LayoutEngine::with_algorithm(CpuSubstrate::new(), config, algorithm)?;
    engine.set_points(&positions)?;
    engine.set_edges(topology)?;

    if let Some(path) = physics {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read physics {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid physics {}", path.display()))?;
        let ignored = engine.set_physics_json(&value)?;
        if !ignored.is_empty() {
            warn!(?ignored, "physics file contains unrecognized options");
        }
    }

    info!(
        algorithm = %algorithm,
        nodes = positions.len(),
        edges = graph.edges.len(),
        steps,
        "starting layout"
    );
    for step in 0..steps {
        let report = engine.tick(step)?;
        debug!(step, global_speed = ?report.global_speed, "step complete");
    }

    let result = LayoutOutput {
        algorithm: engine.algorithm_name(),
        steps: engine.steps_completed(),
        positions: engine.cur_points()?,
    };
    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(output = %path.display(), "wrote positions");
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            graph,
            config,
            physics,
            steps,
            algorithm,
            output,
        } => run(
            &graph,
            config.as_deref(),
            physics.as_deref(),
            steps,
            algorithm,
            output.as_deref(),
        ),
    }
}
