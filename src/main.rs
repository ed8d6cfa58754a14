use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apex_compression_tool::cli::{Cli, Commands};
use apex_compression_tool::{classify, read_manifest, Compressor, Decompressor};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.tools.to_config();
    match cli.command {
        Commands::Compress(cmd) => {
            Compressor::from_config(config).compress(&cmd.input, &cmd.output)?;
        }
        Commands::Decompress(cmd) => {
            Decompressor::new(config).decompress(&cmd.input, &cmd.output)?;
        }
        Commands::Info(cmd) => {
            let apex_type = classify(&cmd.path)?;
            if cmd.print_type {
                println!("{}", apex_type);
            } else {
                println!("{}: {}", cmd.path.display(), apex_type);
            }
        }
        Commands::PrintManifest(cmd) => {
            let manifest = read_manifest(&cmd.path)?;
            print!("{}", config.manifest_codec().print(&manifest)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
