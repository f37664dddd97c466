//! Large graph benchmark on the wgpu backend.
//!
//! Run with: cargo run --example large_graph --release

use std::time::Instant;

use graphfield_layout::{GraphData, Simulation, SimulationConfig};

fn bounds(positions: &[graphfield_layout::Position]) -> (f32, f32) {
    let (min_x, max_x, min_y, max_y) = positions.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |(min_x, max_x, min_y, max_y), p| {
            (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
        },
    );
    (max_x - min_x, max_y - min_y)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let point_count = 100_000;
    let link_count = 120_000;

    println!("=== GPU Force Simulation Benchmark ===");
    println!("Graph: {} points, {} links", point_count, link_count);
    println!();

    // Path plus pseudo-random chords.
    let mut links = Vec::with_capacity(link_count * 2);
    for i in 1..point_count {
        links.extend([(i - 1) as u32, i as u32]);
    }
    for i in 0..(link_count - (point_count - 1)) {
        let source = (i * 17) % point_count;
        let target = (i * 31 + 7) % point_count;
        if source != target {
            links.extend([source as u32, target as u32]);
        }
    }

    let config = SimulationConfig {
        space_size: 8192.0,
        repulsion_theta: 1.15,
        ..Default::default()
    };
    let positions = GraphData::random_positions(point_count, config.space_size, 7);

    let mut sim = Simulation::gpu_blocking(config)?;
    println!(
        "Adapter: {}, space size {}",
        sim.backend().context().adapter_name(),
        sim.space_size()
    );
    sim.set_graph(GraphData::new(positions, links))?;
    sim.start(1.0);

    // Warm up
    for _ in 0..5 {
        sim.frame();
    }

    let ticks = 100;
    let start = Instant::now();
    for i in 0..ticks {
        sim.frame();
        if i == 0 || i == 49 || i == 99 {
            let (width, height) = bounds(&sim.positions()?);
            println!("  Tick {:3}: layout size {:.0} x {:.0}", i, width, height);
        }
    }
    let elapsed = start.elapsed();
    let per_second = ticks as f64 / elapsed.as_secs_f64();

    println!();
    println!("=== Results ===");
    println!("  Total time:  {:.2?}", elapsed);
    println!("  Ticks/s:     {:.1}", per_second);
    println!("  ms/tick:     {:.2}ms", 1000.0 / per_second);
    println!("  alpha:       {:.4}", sim.alpha());
    Ok(())
}
