use anyhow::{Context, Result};
use arcodec::{Charset, DecodeOptions, charset_for_label};

pub mod app;
mod codec;
mod detect;
mod extract;
mod formats;

/// Flags shared by the decoding subcommands.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct DecodeArgs {
    /// Ceiling on decoder memory, in KiB
    #[arg(long, value_name = "KB", allow_negative_numbers = true)]
    max_memory_kb: Option<i64>,
    /// Keep reading past damaged archive metadata
    #[arg(long)]
    recover: bool,
    /// Decode every member of a concatenated stream
    #[arg(long)]
    concatenated: bool,
    /// Charset of entry names, e.g. cp437 or shift_jis
    #[arg(long, value_name = "LABEL")]
    charset: Option<String>,
}

impl DecodeArgs {
    pub fn options(&self) -> Result<DecodeOptions> {
        let mut builder = DecodeOptions::builder()
            .with_try_to_recover_broken_archives(self.recover)
            .with_decompress_concatenated(self.concatenated)
            .with_use_default_name_for_unnamed_entries(true);
        if let Some(kb) = self.max_memory_kb {
            builder = builder.with_max_memory_limit_in_kb(kb);
        }
        Ok(builder.build()?)
    }

    pub fn charset(&self) -> Result<Option<Charset>> {
        self.charset
            .as_deref()
            .map(|label| {
                charset_for_label(label).with_context(|| format!("unknown charset '{label}'"))
            })
            .transpose()
    }
}
