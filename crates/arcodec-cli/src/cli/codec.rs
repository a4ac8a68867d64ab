use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use arcodec::{DecodedStream, EncodeOptions, EncodingStream, Registry};
use tracing::info;

use super::DecodeArgs;

#[derive(Clone, Debug, clap::Args)]
pub struct Decompress {
    /// Format to decode; detected from the content when omitted
    #[arg(short, long)]
    format: Option<String>,
    input: PathBuf,
    output: PathBuf,
    #[command(flatten)]
    decode: DecodeArgs,
}

#[derive(Clone, Debug, clap::Args)]
pub struct Compress {
    #[arg(short, long)]
    format: String,
    input: PathBuf,
    output: PathBuf,
    /// Compression level, clamped to what the codec supports
    #[arg(short, long, value_parser = clap::value_parser!(i64).range(0..=22))]
    level: Option<i64>,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

impl Decompress {
    pub fn run(self, registry: &Registry) -> Result<()> {
        let input = open(&self.input)?;
        let options = self.decode.options()?;
        let charset = self.decode.charset()?;

        let (format, decoded) = match &self.format {
            Some(name) => {
                let decoded = registry.open_for_read(name, input, charset, &options)?;
                (registry.get(name)?.name().clone(), decoded)
            }
            None => registry.open_for_read_auto(input, charset, &options)?,
        };
        let mut reader = match decoded {
            DecodedStream::Bytes(reader) => reader,
            DecodedStream::Entries(_) => {
                bail!("'{format}' is an archive; use `arcodec extract`")
            }
        };

        let mut output = create(&self.output)?;
        let written = io::copy(&mut reader, &mut output)
            .with_context(|| format!("failed to decode '{format}' stream"))?;
        output.flush()?;
        info!(%format, bytes = written, "decompressed");
        Ok(())
    }
}

impl Compress {
    pub fn run(self, registry: &Registry) -> Result<()> {
        let mut builder = EncodeOptions::builder();
        if let Some(level) = self.level {
            builder = builder.with_level(level);
        }
        let options = builder.build()?;

        let output = create(&self.output)?;
        let mut writer = match registry.open_for_write(&self.format, output, None, &options)? {
            EncodingStream::Bytes(writer) => writer,
            EncodingStream::Entries(_) => {
                bail!("'{}' is an archive format, not a compressor", self.format)
            }
        };

        let mut input = open(&self.input)?;
        let read = io::copy(&mut input, &mut writer)?;
        writer.finish()?;
        info!(format = %self.format, bytes = read, "compressed");
        Ok(())
    }
}
