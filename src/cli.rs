use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{Config, DEFAULT_ALIGNMENT, DEFAULT_COMPRESSION_LEVEL};

#[derive(Parser, Debug)]
#[command(
    name = "apex_compression_tool",
    about = "Compress APEX files into CAPEX files and back",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub tools: ToolArgs,

    /// Log debug output to stderr.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress an APEX into a CAPEX.
    Compress(TransformCommand),
    /// Recover the original APEX from a CAPEX.
    Decompress(TransformCommand),
    /// Inspect a container.
    Info(InfoCommand),
    /// Print the apex_manifest.pb of an APEX or CAPEX in text form.
    PrintManifest(PrintManifestCommand),
}

#[derive(Args, Debug, Clone)]
pub struct TransformCommand {
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    #[arg(long, value_name = "FILE")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InfoCommand {
    /// Print COMPRESSED or UNCOMPRESSED.
    #[arg(long, action = ArgAction::SetTrue)]
    pub print_type: bool,

    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PrintManifestCommand {
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    /// avbtool binary; the AVB footer is read natively when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    pub avbtool: Option<PathBuf>,

    /// conv_apex_manifest binary; manifests are printed natively when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    pub conv_apex_manifest: Option<PathBuf>,

    /// Directory to look for avbtool and conv_apex_manifest in.
    #[arg(long, global = true, value_name = "DIR")]
    pub tool_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "0-9", default_value_t = DEFAULT_COMPRESSION_LEVEL,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    pub compression_level: u32,
}

impl ToolArgs {
    pub fn to_config(&self) -> Config {
        let config = Config {
            avbtool: self.avbtool.clone(),
            conv_apex_manifest: self.conv_apex_manifest.clone(),
            compression_level: self.compression_level,
            alignment: DEFAULT_ALIGNMENT,
        };
        match &self.tool_dir {
            Some(dir) => config.with_tool_dir(dir),
            None => config,
        }
    }
}
