//! s3shift - object migration and database backup for S3-compatible storage

mod commands;
mod exit_code;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConfigArgs, ConfigSource, DestinationArgs, SourceArgs};
use exit_code::ExitCode;
use output::OutputConfig;

#[derive(Parser, Debug)]
#[command(name = "s3shift", version, about, long_about = None)]
pub struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    destination: DestinationArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy objects from the source endpoint into routed destination buckets
    Migrate(commands::migrate::MigrateArgs),

    /// Export, compress and upload a database backup
    Backup(commands::backup::BackupArgs),

    /// List objects in a bucket
    Ls(commands::ls::LsArgs),

    /// Show which bucket keys route to
    Route(commands::route::RouteArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.no_color || cli.json {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };
    let source = ConfigSource {
        config: cli.config,
        source: cli.source,
        destination: cli.destination,
    };

    let code = match cli.command {
        Commands::Migrate(args) => commands::migrate::execute(args, &source, output_config).await,
        Commands::Backup(args) => commands::backup::execute(args, &source, output_config).await,
        Commands::Ls(args) => commands::ls::execute(args, &source, output_config).await,
        Commands::Route(args) => commands::route::execute(args, &source, output_config),
        Commands::Completions(args) => commands::completions::execute(args),
    };

    std::process::exit(code.as_i32());
}
