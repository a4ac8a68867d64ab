use anyhow::Result;
use arcodec::global;
use clap::{Parser, Subcommand};

use super::codec::{Compress, Decompress};
use super::detect::Detect;
use super::extract::Extract;
use super::formats::Formats;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "arcodec",
    version = env!("CARGO_PKG_VERSION"),
    about,
    long_about = None,
    propagate_version = true
)]
pub struct App {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "d", name = "detect", about = "Print the detected format of each file")]
    Detect(Detect),
    #[command(
        alias = "ls",
        name = "formats",
        about = "List registered formats and their availability"
    )]
    Formats(Formats),
    #[command(alias = "x", name = "decompress", about = "Decode a compressed stream")]
    Decompress(Decompress),
    #[command(alias = "c", name = "compress", about = "Encode a file with a compressor")]
    Compress(Compress),
    #[command(alias = "e", name = "extract", about = "Extract an archive below a directory")]
    Extract(Extract),
}

impl App {
    pub fn run(self) -> Result<()> {
        let registry = global();
        match self.cmd {
            Commands::Detect(cmd) => cmd.run(registry),
            Commands::Formats(cmd) => cmd.run(registry),
            Commands::Decompress(cmd) => cmd.run(registry),
            Commands::Compress(cmd) => cmd.run(registry),
            Commands::Extract(cmd) => cmd.run(registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        App::command().debug_assert();
    }

    #[test]
    fn extract_flags() {
        let app = App::try_parse_from([
            "arcodec", "-v", "extract", "a.zip", "out", "--strip", "1", "--skip-escapes",
            "--charset", "cp437", "--recover", "--max-memory-kb", "2048",
        ])
        .unwrap();
        assert!(app.verbose);
        assert!(matches!(app.cmd, Commands::Extract(_)));
    }

    #[test]
    fn compress_requires_format() {
        assert!(App::try_parse_from(["arcodec", "compress", "in", "out"]).is_err());
        assert!(App::try_parse_from(["arcodec", "compress", "-f", "gz", "in", "out"]).is_ok());
    }
}
