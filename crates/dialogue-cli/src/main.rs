//! A small CLI for exercising a dialogue-runtime config: `validate` checks
//! a flow config file, `chat` drives it turn by turn over stdin/stdout.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use dialogue_checkpoint::InMemoryCheckpointSaver;
use dialogue_nlu::{FlowTrigger, RuleBasedNlu};
use dialogue_runtime::{ConfigLoader, Runtime};

#[derive(Parser)]
#[command(name = "dialogue")]
#[command(about = "Drive a dialogue-runtime flow config interactively", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a flow config file and report any configuration errors.
    Validate {
        /// Path to a YAML config file.
        file: std::path::PathBuf,
    },
    /// Run an interactive chat session against a flow config file.
    Chat {
        /// Path to a YAML config file.
        file: std::path::PathBuf,
        /// User identity the session checkpoints under.
        #[arg(short, long, default_value = "cli-user")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dialogue_runtime::telemetry::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { file } => validate(&file),
        Commands::Chat { file, user } => chat(&file, &user).await,
    }
}

fn validate(file: &std::path::Path) -> anyhow::Result<()> {
    let config = ConfigLoader::from_path(file)?;
    config.validate()?;
    println!("{} is valid: {} flow(s) compiled cleanly", file.display(), config.flows.len());
    Ok(())
}

async fn chat(file: &std::path::Path, user: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::from_path(file)?;
    let nlu = demo_nlu(&config);
    let runtime = Runtime::build(
        &config,
        Arc::new(dialogue_actions::demo::registry()),
        Arc::new(nlu),
        Arc::new(InMemoryCheckpointSaver::new()),
    )?;

    println!("chatting against {} as '{user}' (ctrl-d to exit)", file.display());
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let result = runtime.process_message(user, &line).await?;
        if !result.response.is_empty() {
            writeln!(stdout, "< {}", result.response)?;
        }
        if !result.paused {
            writeln!(stdout, "(flow finished)")?;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }
    Ok(())
}

/// Trigger every configured flow name by its own name as a crude intent
/// match, e.g. `book_flight` fires on any utterance containing "book
/// flight". Good enough for the demo CLI; a real deployment supplies its
/// own `NluService`.
fn demo_nlu(config: &dialogue_runtime::Config) -> RuleBasedNlu {
    let mut nlu = RuleBasedNlu::new();
    for name in config.flows.keys() {
        let phrase = name.replace('_', " ");
        if let Ok(trigger) = FlowTrigger::new(name.clone(), &[&format!(r"(?i){phrase}")]) {
            nlu = nlu.with_trigger(trigger);
        }
    }
    nlu
}
