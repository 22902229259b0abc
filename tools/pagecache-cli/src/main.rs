//! Page cache CLI - inspect and invalidate a deployed page cache.
//!
//! Commands:
//! - `pagecache key` - Show the composite key a request would use
//! - `pagecache get` - Look up an entry
//! - `pagecache delete` - Delete one entry
//! - `pagecache invalidate-path` - Delete every entry under a path
//! - `pagecache invalidate-tag` - Delete every entry carrying a tag

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::{DeleteArgs, GetArgs, InvalidatePathArgs, InvalidateTagArgs, KeyArgs};

/// Page cache CLI - inspect and invalidate cached pages
#[derive(Parser)]
#[command(name = "pagecache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the composite cache key for a request
    Key(KeyArgs),

    /// Look up the entry a request would read
    Get(GetArgs),

    /// Delete the entry a request would read
    Delete(DeleteArgs),

    /// Delete every entry stored under a path
    InvalidatePath(InvalidatePathArgs),

    /// Delete every entry carrying a tag
    InvalidateTag(InvalidateTagArgs),
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let output = output::Output::new(cli.verbose, cli.json);
    let ctx = context::Context::load(cli.config.as_deref(), output)?;

    let result = match cli.command {
        Commands::Key(args) => commands::key::run(args, &ctx).await,
        Commands::Get(args) => commands::get::run(args, &ctx).await,
        Commands::Delete(args) => commands::delete::run(args, &ctx).await,
        Commands::InvalidatePath(args) => commands::invalidate::run_path(args, &ctx).await,
        Commands::InvalidateTag(args) => commands::invalidate::run_tag(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
