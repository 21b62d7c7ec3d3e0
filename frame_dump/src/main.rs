//! Headless frame driver
//!
//! Runs the frame queue over the recording backend and prints every command
//! list it submits, plus the fence waits the ring performed.

mod scene;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use log::info;

use frame_engine::config::Config;
use frame_engine::foundation::logging;
use frame_engine::prelude::*;
use frame_engine::render::backend::recording::{RecordingBackend, Submission};

use scene::{demo_graph, DemoScene, BACK_BUFFERS, BACK_BUFFER_RTV};

const DEFAULT_FRAMES: &str = "4";
const DEMO_CUBES: usize = 3;

#[derive(Debug)]
struct DumpOptions {
    frames: usize,
    config: Option<PathBuf>,
    graph: Option<PathBuf>,
    emit_graph: Option<PathBuf>,
    quiet: bool,
}

fn parse_args() -> Result<DumpOptions> {
    let matches = Command::new("frame_dump")
        .about("Records frames through the frame queue and dumps the submitted command lists")
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("COUNT")
                .help("Number of frames to render")
                .default_value(DEFAULT_FRAMES),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Application configuration (.toml or .ron)"),
        )
        .arg(
            Arg::new("graph")
                .short('g')
                .long("graph")
                .value_name("FILE")
                .help("Render graph to draw instead of the built-in demo graph"),
        )
        .arg(
            Arg::new("emit-graph")
                .long("emit-graph")
                .value_name("FILE")
                .help("Write the demo render graph to FILE and exit"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Print only the per-frame summary")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let frames = matches
        .get_one::<String>("frames")
        .map_or(DEFAULT_FRAMES, String::as_str)
        .parse()
        .context("Invalid frame count")?;

    Ok(DumpOptions {
        frames,
        config: matches.get_one::<String>("config").map(PathBuf::from),
        graph: matches.get_one::<String>("graph").map(PathBuf::from),
        emit_graph: matches.get_one::<String>("emit-graph").map(PathBuf::from),
        quiet: matches.get_flag("quiet"),
    })
}

fn main() -> Result<()> {
    let options = parse_args()?;

    let config = match &options.config {
        Some(path) => ApplicationConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ApplicationConfig::default(),
    };
    logging::init_with_level(&config.logging);
    config.validate().map_err(anyhow::Error::msg)?;

    if let Some(path) = &options.emit_graph {
        demo_graph()
            .save_to_file(path)
            .with_context(|| format!("Failed to write render graph to {}", path.display()))?;
        info!("Wrote demo render graph to {}", path.display());
        return Ok(());
    }

    let graph = match &options.graph {
        Some(path) => RenderGraph::load_from_file(path)
            .with_context(|| format!("Failed to load render graph from {}", path.display()))?,
        None => demo_graph(),
    };

    run(&options, &config.frame_queue, &graph)
}

fn run(options: &DumpOptions, config: &FrameQueueConfig, graph: &RenderGraph) -> Result<()> {
    let backend = RecordingBackend::new();
    let mut queue = FrameQueue::new(config.clone(), backend.parts(config))?;
    let mut swap_chain = StaticSwapChain::new(BACK_BUFFERS.to_vec(), BACK_BUFFER_RTV, 8);
    let scene = DemoScene::new(DEMO_CUBES);

    info!(
        "Rendering {} frames with {} frames in flight",
        options.frames, config.frame_queue_size
    );

    queue.init_pipeline(&swap_chain, graph)?;
    print_submission("init", backend.submissions().last(), options.quiet);

    for frame in 0..options.frames {
        let handle = queue.begin_frame(&swap_chain)?;
        let summary = queue.render_frame(handle, &scene.inputs(graph))?;
        queue.end_frame(handle)?;
        swap_chain.present();

        println!(
            "frame {frame}: slot {} fence {} | {} passes, {} subpasses, {} draws",
            handle.index(),
            handle.fence_value(),
            summary.passes,
            summary.subpasses,
            summary.draws
        );
        print_submission("frame", backend.submissions().last(), options.quiet);
    }

    println!("fence waits:");
    for wait in backend.waits() {
        let outcome = if wait.blocked { "blocked" } else { "ready" };
        println!("  value {:>3} {outcome}", wait.value);
    }
    println!("signals: {:?}", backend.signals());
    println!(
        "completed {} of {}",
        backend.completed_value(),
        queue.next_fence_value().saturating_sub(1)
    );
    Ok(())
}

fn print_submission(label: &str, submission: Option<&Submission>, quiet: bool) {
    let Some(submission) = submission else {
        return;
    };
    println!(
        "  {label} submission: lists {:?}, {} commands",
        submission.lists,
        submission.commands.len()
    );
    if quiet {
        return;
    }
    for (position, command) in submission.commands.iter().enumerate() {
        println!("    {position:>3}: {command:?}");
    }
}
