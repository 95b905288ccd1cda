// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! Simulate a draw on a GPU rasterizer.
//!
//! See `lib.rs` for details.

use clap::Parser;
use indicatif::ProgressBar;
use raster_engine::engine::Engine;
use raster_engine::sim_error;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_models::config::RasterizationStrategy;
use raster_models::stage::Stage;
use raster_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use raster_track::{Track, Tracker, error, info};
use sim_raster::config::SimConfig;
use sim_raster::raster_builder::{Platform, build_platform};

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "GPU rasterizer draw application")]
struct Cli {
    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Write the log to a file.
    #[arg(long)]
    log_file: Option<String>,

    /// Level of log message to write to `--log-file`.
    #[arg(long, default_value = "Trace")]
    log_level: log::Level,

    /// TOML file of configuration overriding the defaults.
    #[arg(long)]
    config: Option<String>,

    /// Override the number of triangles drawn.
    #[arg(long)]
    triangles: Option<usize>,

    /// Override the seed the triangles are generated from.
    #[arg(long)]
    seed: Option<u64>,

    /// Perform triangle setup on the shader pool.
    #[arg(long)]
    shader_setup: bool,

    /// Traverse triangles row by row instead of tile by tile.
    #[arg(long)]
    scanline: bool,

    /// Configure a cycle on which to terminate the simulation. Use 0 to run
    /// until completion.
    #[arg(long, default_value = "0")]
    finish_cycle: Cycle,

    /// Cycles without progress while drawing after which the simulation is
    /// considered hung.
    #[arg(long, default_value = "10000")]
    stall_cycles: Cycle,

    /// Show a progress bar of the triangles sent.
    #[arg(long)]
    progress: bool,

    /// Number of cycles between updates to the progress bar.
    #[arg(long, default_value = "1000")]
    progress_cycles: Cycle,
}

fn setup_all_trackers(args: &Cli) -> Result<Tracker, SimError> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: args.log_file.is_some(),
            level: args.log_level,
            filter_regex: "",
            file: args.log_file.as_deref(),
        },
    };
    setup_trackers(&config).map_err(|e| SimError(e.to_string()))
}

fn load_config(args: &Cli) -> Result<SimConfig, SimError> {
    let mut config =
        SimConfig::load(args.config.as_deref()).map_err(|e| SimError(e.to_string()))?;
    if let Some(triangles) = args.triangles {
        config.scene.triangles = triangles;
    }
    if let Some(seed) = args.seed {
        config.scene.seed = seed;
    }
    if args.shader_setup {
        config.rasterizer.shader_setup = true;
    }
    if args.scanline {
        config.rasterizer.strategy = RasterizationStrategy::Scanline;
    }
    Ok(config)
}

/// Step the engine until the command script completes, checking for a stall
/// and the finish cycle every cycle.
fn run(engine: &mut Engine, platform: &Platform, args: &Cli, triangles: usize) -> SimResult {
    let top = engine.top().clone();
    let progress_bar = args.progress.then(|| ProgressBar::new(triangles as u64));
    let mut seen = 0;

    while !platform.processor.borrow().done() {
        let cycle = engine.cycle();
        if args.finish_cycle != 0 && cycle >= args.finish_cycle {
            return sim_error!(format!("{top}: finished at cycle {cycle}"));
        }
        if platform
            .rasterizer
            .borrow()
            .detect_stall(cycle, args.stall_cycles)
        {
            error!(top ; "{}", platform.rasterizer.borrow().stall_report());
            return sim_error!(format!("{top}: stall detected at cycle {cycle}"));
        }
        if let Some(progress_bar) = &progress_bar {
            if args.progress_cycles != 0 && cycle % args.progress_cycles == 0 {
                let sent = platform.source.borrow().sent();
                progress_bar.inc(u64::from(sent) - seen);
                seen = u64::from(sent);
            }
        }
        engine.step()?;
    }

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish();
    }
    Ok(())
}

fn report(engine: &Engine, platform: &Platform) {
    let top = engine.top();
    let rasterizer = platform.rasterizer.borrow();

    info!(top ; "Completed at cycle {}", engine.cycle());
    info!(top ; "setup: {}", rasterizer.setup().statistics());
    info!(top ; "traversal: {}", rasterizer.traversal().statistics());
    info!(top ; "hz: {}", rasterizer.hierarchical_z().statistics());
    info!(top ; "ffifo: {}", rasterizer.fragment_fifo().statistics());
    info!(top ; "interpolator: {}", rasterizer.interpolator().statistics());
    info!(top ; "commands: {}", rasterizer.command_statistics());
    info!(top ; "sink: {}", platform.sink.borrow().statistics());
    if let Some(pool) = &platform.pool {
        info!(top ; "shader pool: {} setups", pool.borrow().completed());
    }
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();

    let tracker = setup_all_trackers(&args)?;
    let config = load_config(&args)?;

    let mut engine = Engine::new(&tracker);
    let top = engine.top().clone();
    info!(top ;
        "Drawing {} triangles ({:?}, shader setup {}) on a {}x{} display.",
        config.scene.triangles,
        config.rasterizer.strategy,
        config.rasterizer.shader_setup,
        config.scene.width,
        config.scene.height
    );

    let platform = build_platform(&mut engine, &config)?;
    info!(top ; "Platform built and connected");

    let result = run(&mut engine, &platform, &args, config.scene.triangles);
    if let Err(e) = &result {
        error!(top ; "{e}");
    } else {
        report(&engine, &platform);
        info!(top ; "Pass (cycle {})", engine.cycle());
    }
    tracker.shutdown();
    result
}
