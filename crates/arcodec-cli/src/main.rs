//! arcodec - detect, compress, decompress and extract
//!
//! Usage:
//!   arcodec detect FILE...              Print the format of each file
//!   arcodec formats                     List registered formats
//!   arcodec decompress [-f NAME] IN OUT Decode a compressed stream
//!   arcodec compress -f NAME IN OUT     Encode a file
//!   arcodec extract ARCHIVE DIR         Unpack an archive below DIR

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::app::App;

mod cli;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let app = App::parse();
    init_tracing(app.verbose);
    app.run()
}
