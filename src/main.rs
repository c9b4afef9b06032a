mod demo;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tuyau_core::config::load_toml;

use demo::{Config, DemoContext};

#[derive(Parser)]
#[command(name = "tuyau", version, about = "Run a dependency graph of steps over shared variables")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tuyau.toml")]
    config: PathBuf,

    /// Worker threads (overrides `demo.threads`)
    #[arg(short, long, env = "TUYAU_THREADS")]
    threads: Option<usize>,

    /// Skip the input/output hazard check at build time
    #[arg(long)]
    no_check_io: bool,

    /// Demo input x
    #[arg(short = 'x', long)]
    x: Option<f64>,

    /// Demo input y
    #[arg(short = 'y', long)]
    y: Option<f64>,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Dot,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tuyau=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config: Config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config");
        load_toml(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
        Config::default()
    };

    if let Some(threads) = cli.threads {
        config.demo.threads = threads;
    }
    if let Some(x) = cli.x {
        config.demo.x = x;
    }
    if let Some(y) = cli.y {
        config.demo.y = y;
    }
    if cli.no_check_io {
        config.engine.check_io = false;
    }

    let ctx = Arc::new(DemoContext::new(&config.demo));
    let pipeline = demo::build(&ctx, config.engine.clone())?;
    pipeline.execute(Arc::clone(&ctx))?;

    let view = pipeline.view();
    match cli.format {
        Format::Text => print!("{}", render::text(&view, &pipeline.summary())),
        Format::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        Format::Dot => print!("{}", render::dot(&view)),
    }

    if let Some(err) = pipeline.runtime_error() {
        anyhow::bail!("pipeline '{}' failed: {err}", pipeline.name());
    }
    Ok(())
}
