use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use sl_log::LogFiles;
use tracing_subscriber::EnvFilter;

use sl_cli::commands::{events, rebuild, record, summarize};
use sl_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests run the binary many times in one process tree
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Record(args)) => {
            let config = args.apply(load_config(cli.config.as_deref())?);
            record::run(&config, &args.source, args.fast)?;
        }
        Some(Commands::Summarize { log, out }) => {
            let config = load_config(cli.config.as_deref())?;
            summarize::run(log, out.as_deref(), &config.reconstruct_config())?;
        }
        Some(Commands::Rebuild { dir }) => {
            let config = load_config(cli.config.as_deref())?;
            let files = LogFiles::new(&config.log_dir, &config.summary_dir, &config.out_prefix);
            rebuild::run(&files, dir.as_deref(), &config.reconstruct_config())?;
        }
        Some(Commands::Events { log, kind }) => {
            events::run(log, kind.as_deref())?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
