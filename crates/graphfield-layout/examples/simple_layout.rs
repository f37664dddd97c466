//! Lay out a small ring-with-chords graph on the CPU backend until it settles.
//!
//! Run with: cargo run --example simple_layout

use std::time::Instant;

use graphfield_layout::{GraphData, Simulation, SimulationConfig, SimulationEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let point_count = 1000;
    let config = SimulationConfig {
        space_size: 1024.0,
        decay: 300.0,
        ..Default::default()
    };

    // A ring plus chords every 17 points.
    let mut links = Vec::new();
    for i in 0..point_count as u32 {
        links.extend([i, (i + 1) % point_count as u32]);
        if i % 17 == 0 {
            links.extend([i, (i * 31 + 7) % point_count as u32]);
        }
    }
    let positions = GraphData::random_positions(point_count, config.space_size, 42);
    println!(
        "Laying out {} points and {} links...",
        point_count,
        links.len() / 2
    );

    let mut sim = Simulation::cpu(config);
    sim.set_graph(GraphData::new(positions, links))?;
    sim.start(1.0);

    let start = Instant::now();
    while sim.is_running() {
        sim.frame();
        for event in sim.drain_events() {
            if let SimulationEvent::Tick { alpha, progress } = event {
                if sim.tick_count() % 50 == 0 {
                    println!(
                        "Tick {:4}: alpha {:.4}, progress {:.0}%",
                        sim.tick_count(),
                        alpha,
                        progress * 100.0
                    );
                }
            }
        }
    }
    let elapsed = start.elapsed();

    println!(
        "\nSettled after {} ticks in {:.2?} ({:.1} ticks/sec)",
        sim.tick_count(),
        elapsed,
        sim.tick_count() as f64 / elapsed.as_secs_f64()
    );

    let positions = sim.positions()?;
    println!("\nFinal positions (first 5 points):");
    for (i, pos) in positions.iter().take(5).enumerate() {
        println!("  Point {}: ({:.2}, {:.2})", i, pos.x, pos.y);
    }
    Ok(())
}
