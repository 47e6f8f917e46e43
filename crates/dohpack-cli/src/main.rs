#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use dohpack_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dohpack")]
#[command(author, version, about = "Build manifests and bake dohballs for Doh projects", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Scan the project and write manifests
    Build {
        /// Also bake dohballs
        #[arg(long)]
        bake: bool,

        /// Treat syntax errors as fatal
        #[arg(long)]
        strict: bool,
    },

    /// Build, then bake dohballs for every exposed package
    Bake {
        /// Treat syntax errors as fatal
        #[arg(long)]
        strict: bool,
    },

    /// Rebuild whenever a source file changes
    Watch {
        /// Also bake dohballs on each rebuild
        #[arg(long)]
        bake: bool,

        /// Quiet period before a rebuild, in milliseconds
        #[arg(long, default_value = "100")]
        debounce_ms: u64,
    },

    /// Resolve a DohPath against the project root
    Resolve {
        /// Path to resolve (`/x`, `^/x`, `./x`, absolute)
        path: String,

        /// File or directory that caret and dot paths are relative to
        #[arg(long, value_name = "PATH")]
        from: Option<String>,

        /// Output form
        #[arg(long, value_enum, default_value = "absolute")]
        form: commands::resolve::Form,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    let Some(command) = cli.command else {
        return commands::version::run();
    };

    if matches!(command, Commands::Version) {
        return commands::version::run();
    }

    logging::init(config.verbosity, config.json_logs);

    match command {
        Commands::Version => commands::version::run(),
        Commands::Build { bake, strict } => commands::build::run(&config, bake, strict, cli.json),
        Commands::Bake { strict } => commands::build::run(&config, true, strict, cli.json),
        Commands::Watch { bake, debounce_ms } => {
            commands::watch::run(config.with_watch(true), bake, debounce_ms, cli.json)
        }
        Commands::Resolve { path, from, form } => {
            commands::resolve::run(&config, &path, from.as_deref(), form, cli.json)
        }
    }
}
