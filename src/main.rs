use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{fmt, EnvFilter};

use simlab::config::{self, Config};
use simlab::gui;
use simlab::session::SessionManager;
use simlab::types::exercise::Domain;

#[derive(Parser, Debug)]
#[command(name = "simlab")]
#[command(about = "Turn science exercises into simulations, then grade answers and hand out hints", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse an exercise and print its canonical form as JSON
    Parse {
        /// Exercise text, or a path to a .yaml/.yml/.json template or a text file
        source: String,
        /// Subject area hint (physics, chemistry, biology)
        #[arg(long)]
        domain: Option<Domain>,
        /// Try the language-model parser even if the config disables it
        #[arg(long)]
        llm: bool,
    },
    /// Load an exercise, run the headless simulation and grade answers
    Run {
        source: String,
        #[arg(long)]
        domain: Option<Domain>,
        /// Answer for a target, as ID=VALUE (repeatable)
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
        /// Number of hints to request after grading
        #[arg(long, default_value_t = 0)]
        hints: usize,
        /// Save results; optionally give a file name
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        save: Option<String>,
    },
    /// Open the desktop viewer
    Gui {
        /// Exercise to load on startup
        source: Option<String>,
    },
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, value)) if !id.trim().is_empty() => Ok((id.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected ID=VALUE, got '{}'", raw)),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// A broken or missing config is reported and replaced by the defaults.
fn load_config(path: &Path) -> (Config, Option<String>) {
    match config::load_config_from_file(&path.to_string_lossy()) {
        Ok(loaded_config) => (loaded_config, None),
        Err(e) => {
            warn!("{}; using default configuration", e);
            (Config::default(), Some(e.to_string()))
        }
    }
}

fn run_command(command: Commands, mut config: Config, config_error: Option<String>) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Parse { source, domain, llm } => {
            if llm {
                config.llm.enabled = true;
            }
            let mut manager = SessionManager::from_config(&config);
            let exercise = manager.load(&source, domain)?;
            println!("{}", serde_json::to_string_pretty(exercise)?);
        }
        Commands::Run {
            source,
            domain,
            answers,
            hints,
            save,
        } => {
            let mut manager = SessionManager::from_config(&config);
            let exercise = manager.load(&source, domain)?;
            println!("Exercise: {} ({}, {})", exercise.display_name(), exercise.kind, exercise.domain);

            manager.run_simulation()?;
            let world = manager.engine();
            println!("Simulated {:.2}s in {} frames", world.time(), world.trajectory().len());
            for body in world.bodies() {
                let landing = body
                    .first_landing
                    .map_or_else(|| "never left the ground".to_string(), |(x, t)| format!("landed at x = {:.2} m, t = {:.2} s", x, t));
                println!("  {}: peak height {:.2} m, {}", body.name, body.peak_height, landing);
            }

            let answers: BTreeMap<String, String> = answers.into_iter().collect();
            let report = manager.check_answers(&answers)?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            for _ in 0..hints {
                println!("Hint: {}", manager.get_hint(None));
            }

            if let Some(name) = save {
                let path = manager.save_results(Some(&name))?;
                println!("Saved results to {}", path.display());
            }
        }
        Commands::Gui { source } => {
            gui::run(config, config_error, source)?;
        }
    }
    Ok(())
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let (config, config_error) = load_config(&cli.config);

    let result = match cli.command {
        Some(command) => run_command(command, config, config_error),
        None => gui::run(config, config_error, None).map_err(Into::into),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
