use std::fmt;
use std::io::{self, Read, Write};

use crate::error::Result;
use crate::format::FormatName;
use crate::options::DecodeOptions;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink { target: String },
}

/// An entry read from an archive stream, positioned at its content.
///
/// `data` is only valid inside the visitor call that received it.
pub struct PendingEntry<'a> {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub mode: Option<u32>,
    pub kind: EntryKind,
    pub data: &'a mut dyn Read,
}

impl PendingEntry<'_> {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }
}

impl fmt::Debug for PendingEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// What the visitor wants next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// Decoded archive: a single forward pass over its entries.
pub trait ArchiveReader: Send {
    fn format(&self) -> &FormatName;

    fn for_each_entry(
        &mut self,
        visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
    ) -> Result<()>;
}

/// Encoding side of an archive format.
///
/// `finish` writes trailers and flushes; dropping without it leaves a
/// truncated archive.
pub trait ArchiveWriter: Send {
    fn format(&self) -> &FormatName;

    fn append_file(
        &mut self,
        name: &str,
        mode: Option<u32>,
        size: u64,
        data: &mut dyn Read,
    ) -> Result<()>;

    fn append_dir(&mut self, name: &str, mode: Option<u32>) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

/// Encoding side of a compressor. Must be finished to emit the trailer.
pub trait CompressWriter: Write + Send {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Result of opening a stream for reading.
pub enum DecodedStream {
    Bytes(Box<dyn Read + Send>),
    Entries(Box<dyn ArchiveReader>),
}

impl DecodedStream {
    pub fn into_bytes(self) -> Option<Box<dyn Read + Send>> {
        match self {
            Self::Bytes(reader) => Some(reader),
            Self::Entries(_) => None,
        }
    }

    pub fn into_entries(self) -> Option<Box<dyn ArchiveReader>> {
        match self {
            Self::Entries(reader) => Some(reader),
            Self::Bytes(_) => None,
        }
    }
}

impl fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(_) => f.write_str("DecodedStream::Bytes"),
            Self::Entries(reader) => write!(f, "DecodedStream::Entries({})", reader.format()),
        }
    }
}

/// Result of opening a stream for writing.
pub enum EncodingStream {
    Bytes(Box<dyn CompressWriter>),
    Entries(Box<dyn ArchiveWriter>),
}

impl EncodingStream {
    pub fn into_bytes(self) -> Option<Box<dyn CompressWriter>> {
        match self {
            Self::Bytes(writer) => Some(writer),
            Self::Entries(_) => None,
        }
    }

    pub fn into_entries(self) -> Option<Box<dyn ArchiveWriter>> {
        match self {
            Self::Entries(writer) => Some(writer),
            Self::Bytes(_) => None,
        }
    }
}

impl fmt::Debug for EncodingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(_) => f.write_str("EncodingStream::Bytes"),
            Self::Entries(writer) => write!(f, "EncodingStream::Entries({})", writer.format()),
        }
    }
}

/// Default name handed to unnamed entries when the options ask for one.
pub(crate) fn name_or_default(name: String, index: usize, options: &DecodeOptions) -> String {
    if name.is_empty() && options.use_default_name_for_unnamed_entries() {
        format!("unnamed-{index}")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_only_when_asked() {
        let on = DecodeOptions::builder()
            .with_use_default_name_for_unnamed_entries(true)
            .build()
            .unwrap();
        assert_eq!(name_or_default(String::new(), 3, &on), "unnamed-3");
        assert_eq!(name_or_default("a.txt".into(), 3, &on), "a.txt");
        assert_eq!(name_or_default(String::new(), 3, &DecodeOptions::DEFAULT), "");
    }

    #[test]
    fn pending_entry_kinds() {
        let mut data = io::empty();
        let entry = PendingEntry {
            index: 0,
            name: "bin/".into(),
            size: 0,
            mode: Some(0o755),
            kind: EntryKind::Directory,
            data: &mut data,
        };
        assert!(entry.is_directory());
        assert!(!entry.is_file());
    }
}
