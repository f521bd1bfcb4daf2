//! Mirror Bot CLI
//!
//! Runs the AI-MIRROR Telegram bot, or a local console session against the
//! same completion engine.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use mirror_bot::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Mirror Bot - reflects the structure of your thinking back to you
#[derive(Parser)]
#[command(name = "mirror-bot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file path (JSON)
    #[arg(short, long, env = ENV_CONFIG_PATH, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot
    Run(ModelArgs),

    /// Start an interactive console session
    Chat(ChatArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments shared by commands that talk to the model.
#[derive(Args)]
struct ModelArgs {
    /// Model to use (overrides config and environment)
    #[arg(short, long)]
    model: Option<String>,
}

/// Arguments for the chat command
#[derive(Args)]
struct ChatArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Custom prompt prefix
    #[arg(short, long, default_value = "> ")]
    prompt: String,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration with secrets redacted
    Show,
    /// Show the settings file path
    Path,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", DisplayError(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mirror_bot={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.config).await,
        Commands::Chat(args) => cmd_chat(args, cli.config).await,
        Commands::Config(args) => cmd_config(args, cli.config).await,
    }
}

/// Load settings and environment, applying a `--model` override.
async fn load_config(path: Option<PathBuf>, model: Option<String>) -> Result<BotConfig> {
    Ok(BotConfig::resolve(path.as_deref(), model.as_deref()).await?)
}

/// Build the OpenAI-compatible completion model.
fn create_model(config: &BotConfig) -> Result<Arc<dyn Model>> {
    let client = OpenAIClient::builder(config.require_api_key()?)
        .base_url(&config.provider.base_url)
        .timeout_secs(config.provider.timeout_secs)
        .build()?;
    Ok(Arc::new(client.completion_model(&config.provider.model)))
}

/// Start the Telegram bot.
async fn cmd_run(args: ModelArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, args.model).await?;

    // Both credentials are checked before anything starts.
    config.require_bot_token()?;
    let model = create_model(&config)?;

    tracing::info!(model = %config.provider.model, "starting mirror-bot");

    let gateway = Gateway::builder()
        .model(model)
        .bot_config(config)
        .enable_telegram(true)
        .build()?;

    gateway
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

/// Start an interactive console session.
async fn cmd_chat(args: ChatArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, args.model.model).await?;
    let model = create_model(&config)?;

    let cli = Arc::new(CliChannel::with_config(
        CliChannelConfig::new().prompt(args.prompt),
    ));
    let closed = cli.closed();

    println!(
        "Mirror Bot Chat | model: {} | type 'exit' to quit\n",
        config.provider.model
    );

    let gateway = Gateway::builder()
        .model(model)
        .bot_config(config)
        .enable_telegram(false)
        .channel(cli)
        .build()?;

    gateway
        .run_until(async {
            tokio::select! {
                () = closed.notified() => {}
                _ = tokio::signal::ctrl_c() => println!(),
            }
        })
        .await
}

/// Configuration inspection.
async fn cmd_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        ConfigCommands::Path => match config_path {
            Some(path) => println!("{}", path.display()),
            None => println!("(none; set --config or {ENV_CONFIG_PATH})"),
        },
        ConfigCommands::Show => {
            let config = load_config(config_path, None).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!();
            println!("Environment:");
            print_secret_status(
                &format!("{ENV_BOT_TOKEN} / {ENV_TELEGRAM_TOKEN}"),
                config.telegram.token.is_some(),
            );
            print_secret_status(ENV_API_KEY, config.provider.api_key.is_some());
        }
    }

    Ok(())
}

/// Print whether a secret is configured, never its value.
fn print_secret_status(name: &str, set: bool) {
    println!("  {name}: {}", if set { "set" } else { "-" });
}
