mod audio;
mod commands;

use clap::{Parser, Subcommand};
use etude_core::EngineConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices => commands::devices(),
        Commands::Play {
            arrangement,
            speed,
            looping,
            seconds,
        } => commands::play(&config, &arrangement, speed, looping, seconds),
        Commands::Record {
            input,
            seconds,
            out,
            quantize,
        } => commands::record(&config, input, seconds, &out, quantize),
        Commands::Replay {
            file,
            output,
            speed,
            looping,
            seconds,
        } => commands::replay(&config, &file, output, speed, looping, seconds),
        Commands::Practice {
            arrangement,
            input,
            speed,
        } => commands::practice(&config, &arrangement, input, speed),
        Commands::Analyze { session, baseline } => commands::analyze(&session, baseline.as_deref()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::load(path)?;
            tracing::info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Piano practice engine", long_about = None)]
struct Cli {
    /// JSON engine configuration; missing fields take defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List MIDI inputs, MIDI outputs and audio outputs.
    Devices,
    /// Play an arrangement (.mid or .json) through the built-in synth.
    Play {
        arrangement: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long = "loop")]
        looping: bool,
        /// Stop after this many seconds; required to end a looping run.
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Record from a MIDI input to a .mid or .json file.
    Record {
        #[arg(long)]
        input: String,
        #[arg(long)]
        seconds: f64,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        quantize: bool,
    },
    /// Send a recorded take (.mid or .json) to a MIDI output.
    Replay {
        file: PathBuf,
        /// Output device id; the first output when omitted.
        #[arg(long)]
        output: Option<String>,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long = "loop")]
        looping: bool,
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Play an arrangement while scoring what is played on a MIDI input.
    Practice {
        arrangement: PathBuf,
        #[arg(long)]
        input: String,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
    /// Analyze a practice session JSON file and print the result.
    Analyze {
        session: PathBuf,
        /// Earlier analysis output to compare against.
        #[arg(long)]
        baseline: Option<PathBuf>,
    },
}
