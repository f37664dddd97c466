//! `gf generate` - write a deterministic random graph file.

use std::path::Path;

use anyhow::{Context, Result};

use graphfield_layout::GraphData;

/// Execute the generate command.
pub fn execute(points: usize, links: usize, space_size: f32, seed: u64, output: Option<&Path>) -> Result<GraphData> {
    if links > 0 && points < 2 {
        anyhow::bail!("Links need at least two points, got {}", points);
    }
    let graph = GraphData::random(points, links, space_size, seed);
    let json = serde_json::to_string(&graph)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write graph to {}", path.display()))?;
            eprintln!(
                "✅ Wrote {} points and {} links to {}",
                graph.point_count(),
                graph.link_count(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(graph)
}
