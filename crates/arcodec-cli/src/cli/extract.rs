use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use arcodec::{DecodedStream, EscapePolicy, ExtractOptions, Registry, extract, open_archive};

use super::DecodeArgs;

#[derive(Clone, Debug, clap::Args)]
pub struct Extract {
    archive: PathBuf,
    dir: PathBuf,
    /// Archive format; detected from the content when omitted
    #[arg(short, long)]
    format: Option<String>,
    /// Leading path components to drop from every entry
    #[arg(long, value_name = "N", default_value_t = 0)]
    strip: usize,
    /// Skip entries that would land outside DIR instead of aborting
    #[arg(long)]
    skip_escapes: bool,
    #[command(flatten)]
    decode: DecodeArgs,
}

impl Extract {
    pub fn run(self, registry: &Registry) -> Result<()> {
        let file = File::open(&self.archive)
            .with_context(|| format!("failed to open {}", self.archive.display()))?;
        let input = BufReader::new(file);
        let options = self.decode.options()?;
        let charset = self.decode.charset()?;

        let mut archive = match &self.format {
            Some(name) => match registry.open_for_read(name, input, charset, &options)? {
                DecodedStream::Entries(archive) => archive,
                DecodedStream::Bytes(_) => bail!("'{name}' is a compressor, not an archive"),
            },
            None => open_archive(registry, input, charset, &options)?,
        };

        let policy = if self.skip_escapes { EscapePolicy::Skip } else { EscapePolicy::Abort };
        let extract_options = ExtractOptions::default()
            .strip_components(self.strip)
            .escape_policy(policy);
        let report = extract(archive.as_mut(), &self.dir, &extract_options)
            .with_context(|| format!("failed to extract {}", self.archive.display()))?;

        for skipped in &report.skipped {
            eprintln!("skipped {} ({:?})", skipped.entry, skipped.reason);
        }
        println!(
            "extracted {} entries ({} bytes) from {} archive into {}",
            report.entry_count(),
            report.total_bytes,
            report.format,
            self.dir.display()
        );
        Ok(())
    }
}
