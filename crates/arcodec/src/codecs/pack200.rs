//! Pack200, decoded through the JDK's `unpack200` tool.
//!
//! There is no encoder. The tool is looked up and version-probed on first
//! use; without it the format is detected but reports decode unavailable.

use std::fs::File;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::debug;

use super::compressor;
use crate::entry::DecodedStream;
use crate::error::{Error, Result};
use crate::format::{Charset, names};
use crate::handler::CodecHandler;
use crate::options::DecodeOptions;
use crate::probe::ExternalToolProbe;
use crate::registry::RegistryConfig;
use crate::signature::{Signature, is_pack200};

const TOOL: &str = "unpack200";

pub(super) fn handler(config: &RegistryConfig) -> CodecHandler {
    compressor(names::PACK200, config)
        .signature(Signature::magic(4, is_pack200))
        .decoder(decode)
        .decode_probe(Arc::new(ExternalToolProbe::new(TOOL)))
        .build()
}

/// Unpacked jar plus the scratch directory it lives in.
struct Unpacked {
    file: File,
    _scratch: TempDir,
}

impl Read for Unpacked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

fn decode(
    mut reader: Box<dyn Read + Send>,
    _: Option<Charset>,
    _: &DecodeOptions,
) -> Result<DecodedStream> {
    let scratch = tempfile::Builder::new().prefix("arcodec-pack200-").tempdir()?;
    let packed = scratch.path().join("input.pack");
    let unpacked = scratch.path().join("output.jar");
    io::copy(&mut reader, &mut File::create(&packed)?)?;

    let tool = which::which(TOOL).map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
    debug!(tool = %tool.display(), "unpacking pack200 stream");
    let output = Command::new(tool)
        .arg(&packed)
        .arg(&unpacked)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::format(
            &names::PACK200,
            io::Error::other(format!("{TOOL} failed ({}): {}", output.status, stderr.trim())),
        ));
    }

    Ok(DecodedStream::Bytes(Box::new(Unpacked {
        file: File::open(&unpacked)?,
        _scratch: scratch,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_only_and_detectable() {
        let handler = handler(&RegistryConfig::default());
        assert!(handler.matches(&[0xCA, 0xFE, 0xD0, 0x0D, 0x07]));
        assert!(!handler.matches(&[0xCA, 0xFE, 0xBA, 0xBE]));
        assert!(!handler.can_encode());
        assert!(!handler.is_encode_available());
    }

    #[test]
    fn availability_follows_tool() {
        let handler = handler(&RegistryConfig::default());
        if which::which(TOOL).is_err() {
            assert!(!handler.is_decode_available());
        }
        // cached either way
        assert_eq!(handler.is_decode_available(), handler.is_decode_available());
    }
}
