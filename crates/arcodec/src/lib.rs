//! Codec registry with content-based format detection and zip-slip safe
//! extraction.
//!
//! # Architecture
//!
//! - `registry.rs` - Named handler table, global instance, open calls
//! - `handler.rs` - Handler records: signatures, factories, availability
//! - `detect.rs` - Magic-then-heuristic, first-match detection
//! - `signature.rs` - Byte matchers for the built-in formats, tar heuristic
//! - `probe.rs` - Memoized, time-bounded backend probing
//! - `options.rs` - Immutable decode/encode options and their builders
//! - `sanitize.rs` - Path resolution (zip-slip prevention)
//! - `extract.rs` - Writing archive entries below a root
//! - `codecs/` - Built-in compressors and archive containers
//!
//! # Key Features
//!
//! - **First match wins**: concrete magic bytes always beat heuristics
//! - **Degrades, never fails**: a missing backend makes one format
//!   unavailable, nothing else
//! - **Bounded prefix**: detection reads at most [`Registry::signature_window`]
//!   bytes

pub use detect::{read_prefix, read_prefix_and_rewind};
pub use entry::{
    ArchiveReader, ArchiveWriter, CompressWriter, DecodedStream, EncodingStream, EntryKind,
    PendingEntry, Visit,
};
pub use error::{Error, ErrorKind, Operation, Result};
pub use extract::{
    EscapePolicy, ExtractOptions, ExtractReport, ExtractedEntry, PermissionStrategy, Progress,
    SkipReason, SkippedEntry, SymlinkPolicy, extract, extract_from_reader, open_archive,
};
pub use format::{Charset, FormatKind, FormatName, charset_for_label, names};
pub use handler::{Capabilities, CodecHandler, CodecHandlerBuilder, DecodeFn, EncodeFn};
pub use options::{
    DecodeOptions, DecodeOptionsBuilder, EncodeOptions, EncodeOptionsBuilder, MAX_LEVEL,
};
pub use probe::{
    Availability, CapabilityProbe, DEFAULT_PROBE_TIMEOUT, ExternalToolProbe, ProbeError,
};
pub use registry::{Registry, RegistryConfig, detect_format, global, open_for_read, open_for_write};
pub use sanitize::{
    ResolvedPath, normalize_path, resolve_entry_path, resolve_entry_path_with,
    resolve_symlink_target, strip_components,
};
pub use signature::{MatchStrength, Signature, TarHeuristic};

mod codecs;
mod detect;
mod entry;
mod error;
mod extract;
mod format;
mod handler;
mod options;
mod probe;
mod registry;
mod sanitize;
mod signature;
