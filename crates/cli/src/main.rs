mod config;
mod error;

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use bridge::{Bridge, BridgeConfig, BridgeState, Provider};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use error::{Error, Result};

#[derive(Parser)]
#[command(name = "toolbridge")]
#[command(about = "Let a language model use local tool servers")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./toolbridge.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the answer
    Ask {
        /// The message, or `-` to read it from stdin
        text: String,
    },

    /// Start an interactive session (default)
    Chat,

    /// List the tools offered to the model
    Tools,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let path = config::resolve_path(cli.config.as_deref())?;
    tracing::debug!(path = %path.display(), "loading config");
    let config = BridgeConfig::load(&path)?;
    let provider = Provider::from_config(&config.model)?;
    let model = provider.to_string();

    let bridge = Bridge::new(config, provider);
    bridge.initialize().await?;

    let outcome = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Ask { text } => cmd_ask(&bridge, &text).await,
        Commands::Chat => cmd_chat(&bridge, &model).await,
        Commands::Tools => cmd_tools(&bridge).await,
    };

    bridge.close().await;
    outcome
}

/// Logs go to stderr so stdout carries only answers.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

async fn cmd_ask(bridge: &Bridge<Provider>, text: &str) -> Result<()> {
    let message = if text == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        text.to_string()
    };

    let message = message.trim();
    if message.is_empty() {
        return Err(Error::EmptyMessage);
    }

    let answer = bridge.process_message(message).await?;
    println!("{answer}");
    Ok(())
}

async fn cmd_chat(bridge: &Bridge<Provider>, model: &str) -> Result<()> {
    let tools = bridge.tools().await?;

    println!("toolbridge v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {model}");
    println!("Tools: {}", tools.len());
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF
            println!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match bridge.process_message(input).await {
            Ok(answer) => println!("\n{answer}\n"),
            Err(e) => {
                eprintln!("Error: {e}\n");
                // A dead server leaves the bridge failed; try to bring it back.
                if bridge.state() == BridgeState::Failed {
                    tracing::warn!("bridge failed, restarting tool servers");
                    bridge.initialize().await?;
                }
            }
        }
    }

    Ok(())
}

async fn cmd_tools(bridge: &Bridge<Provider>) -> Result<()> {
    let tools = bridge.tools().await?;
    if tools.is_empty() {
        println!("No tools available.");
        return Ok(());
    }

    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tool in tools {
        println!("{:width$}  {}", tool.name, tool.description);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_global_flags() {
        let cli = Cli::try_parse_from(["toolbridge", "ask", "hello", "-c", "x.toml", "-vv"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Some(Commands::Ask { text }) if text == "hello"));
    }

    #[test]
    fn chat_is_the_default() {
        let cli = Cli::try_parse_from(["toolbridge"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn ask_requires_text() {
        assert!(Cli::try_parse_from(["toolbridge", "ask"]).is_err());
    }
}
