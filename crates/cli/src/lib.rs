pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use echelon_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "echelon",
    about = "Echelon leave bot operator CLI",
    long_about = "Prepare the leave bot database, load the employee directory, check readiness, \
                  and talk to the bot from a terminal.",
    after_help = "Examples:\n  echelon migrate\n  echelon seed employees.toml\n  \
                  echelon doctor --json\n  echelon chat --sender 263771234567"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an echelon.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Check config, database connectivity, schema and employee directory")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Load employee records from a TOML directory file")]
    Seed {
        #[arg(help = "TOML file with one [[employee]] table per employee")]
        file: PathBuf,
    },
    #[command(about = "Chat with the bot on stdin as the given WhatsApp sender")]
    Chat {
        #[arg(long, help = "Sender id, e.g. 263771234567")]
        sender: String,
        #[arg(long, help = "Also print the Cloud API request body for each reply")]
        payload: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(options, json) }
        }
        Command::Seed { file } => commands::seed::run(options, &file),
        Command::Chat { sender, payload } => commands::chat::run(options, &sender, payload),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command output on stdout stays parseable.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
