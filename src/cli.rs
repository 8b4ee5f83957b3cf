//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "portaprog")]
#[command(
    author,
    version,
    about = "Command channel server for a portable AVR programmer",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (TOML), defaults to ./portaprog.toml if present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory backing the file store
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Run a command line locally instead of serving (`\n` separates lines)
    #[arg(short, long, value_name = "LINE", conflicts_with = "run")]
    pub exec: Vec<String>,

    /// Run a command file from the file store instead of serving
    #[arg(short, long, value_name = "FILE.cmd")]
    pub run: Option<String>,
}
