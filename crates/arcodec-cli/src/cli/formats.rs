use std::io::{self, Write};

use anyhow::Result;
use arcodec::{Capabilities, FormatKind, Registry};

#[derive(Clone, Debug, clap::Args)]
pub struct Formats {
    /// Only compressors or only archives
    #[arg(long, value_parser = ["compressor", "archive"])]
    kind: Option<String>,
}

fn mark(flag: bool) -> &'static str {
    if flag { "yes" } else { "-" }
}

fn row(caps: &Capabilities) -> String {
    format!(
        "{:<14} {:<10} {:<6} {:<6} {:<6}",
        caps.name.as_str(),
        caps.kind.to_string(),
        mark(caps.detectable),
        mark(caps.decode_available),
        mark(caps.encode_available),
    )
}

impl Formats {
    pub fn run(self, registry: &Registry) -> Result<()> {
        let kind = self.kind.as_deref().map(|kind| match kind {
            "archive" => FormatKind::Archive,
            _ => FormatKind::Compressor,
        });

        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{:<14} {:<10} {:<6} {:<6} {:<6}",
            "NAME", "KIND", "DETECT", "DECODE", "ENCODE"
        )?;
        for handler in registry.all() {
            if kind.is_some_and(|kind| handler.kind() != kind) {
                continue;
            }
            writeln!(out, "{}", row(&handler.capabilities()))?;
        }
        Ok(())
    }
}
