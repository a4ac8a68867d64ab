use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use arcodec::{FormatName, Registry};

#[derive(Clone, Debug, clap::Args)]
pub struct Detect {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Detect {
    pub fn run(self, registry: &Registry) -> Result<()> {
        let mut out = io::stdout().lock();
        for path in &self.files {
            let mut file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            let format = registry
                .detect_from_reader(&mut file)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let label = format.as_ref().map_or("unknown", FormatName::as_str);
            if self.files.len() == 1 {
                writeln!(out, "{label}")?;
            } else {
                writeln!(out, "{}: {label}", path.display())?;
            }
        }
        Ok(())
    }
}
