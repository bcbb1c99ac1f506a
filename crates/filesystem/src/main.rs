use clap::Parser;
use filesystem::{FilesystemServer, FsResult, READY_MESSAGE, Sandbox};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Library events log under `filesystem`, this binary's under `mcp_filesystem`.
const DEFAULT_FILTER: &str = "filesystem=info,mcp_filesystem=info";

#[derive(Parser)]
#[command(name = "mcp-filesystem")]
#[command(about = "Filesystem tool server restricted to a set of allowed directories")]
#[command(version)]
struct Cli {
    /// Directories the server may read and write
    #[arg(required = true, value_name = "DIR")]
    allowed_directories: Vec<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> FsResult<()> {
    let cli = Cli::parse();
    let server = FilesystemServer::new(Sandbox::new(&cli.allowed_directories)?);

    eprintln!("Allowed directories: {:?}", server.sandbox().roots());
    eprintln!("{READY_MESSAGE}");

    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    tracing::info!("input closed, shutting down");
    Ok(())
}

/// Logs go to stderr; stdout carries protocol traffic only.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}
