//! Codec registry.
//!
//! # Invariants
//! - Names are unique. Registering an existing name replaces the handler in
//!   place, so it keeps its detection priority.
//! - Built-ins are registered before anything else; new names append, so a
//!   pluggable codec never outranks a built-in it does not replace.
//! - Readers work on a snapshot taken under the read lock and never observe a
//!   handler mid-replacement.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::codecs;
use crate::detect::{detect_in, read_prefix, read_prefix_and_rewind};
use crate::entry::{DecodedStream, EncodingStream};
use crate::error::{Error, Operation, Result};
use crate::format::{Charset, FormatKind, FormatName};
use crate::handler::CodecHandler;
use crate::options::{DecodeOptions, EncodeOptions};
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::signature::TarHeuristic;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub probe_timeout: Duration,
    /// `None` leaves tar detectable by ustar magic only.
    pub tar_heuristic: Option<TarHeuristic>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            tar_heuristic: Some(TarHeuristic::default()),
        }
    }
}

impl RegistryConfig {
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn tar_heuristic(mut self, heuristic: Option<TarHeuristic>) -> Self {
        self.tar_heuristic = heuristic;
        self
    }
}

#[derive(Default)]
struct Table {
    order: Vec<Arc<CodecHandler>>,
    index: HashMap<FormatName, usize>,
}

pub struct Registry {
    config: RegistryConfig,
    table: RwLock<Table>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::with_builtins();
    info!(handlers = registry.len(), "codec registry initialised");
    registry
});

/// Process-wide registry holding the built-in codecs.
pub fn global() -> &'static Registry {
    &GLOBAL
}

impl Registry {
    /// No handlers at all; useful for isolated tests and custom catalogues.
    pub fn empty(config: RegistryConfig) -> Self {
        Self {
            config,
            table: RwLock::new(Table::default()),
        }
    }

    pub fn with_builtins() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let registry = Self::empty(config);
        for handler in codecs::builtin_handlers(&config) {
            registry.register(handler);
        }
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a handler, or replaces the one registered under the same name.
    ///
    /// Returns the replaced handler.
    pub fn register(&self, handler: CodecHandler) -> Option<Arc<CodecHandler>> {
        let handler = Arc::new(handler);
        let name = handler.name().clone();
        let mut table = self.write();
        match table.index.get(&name).copied() {
            Some(slot) => {
                info!(format = %name, "replacing codec handler");
                Some(std::mem::replace(&mut table.order[slot], handler))
            }
            None => {
                debug!(format = %name, "registering codec handler");
                let slot = table.order.len();
                table.order.push(handler);
                table.index.insert(name, slot);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<CodecHandler>> {
        let table = self.read();
        table
            .index
            .get(name)
            .map(|&slot| Arc::clone(&table.order[slot]))
            .ok_or_else(|| Error::UnknownFormat {
                name: name.to_owned(),
            })
    }

    /// Snapshot of every handler in priority order.
    pub fn all(&self) -> Vec<Arc<CodecHandler>> {
        self.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Longest prefix any registered signature inspects.
    pub fn signature_window(&self) -> usize {
        self.read()
            .order
            .iter()
            .map(|handler| handler.signature_window())
            .max()
            .unwrap_or(0)
    }

    pub fn detect(&self, prefix: &[u8]) -> Option<FormatName> {
        self.detect_handler(prefix, None)
            .map(|handler| handler.name().clone())
    }

    /// Detection restricted to compressors or to archives.
    pub fn detect_kind(&self, prefix: &[u8], kind: FormatKind) -> Option<FormatName> {
        self.detect_handler(prefix, Some(kind))
            .map(|handler| handler.name().clone())
    }

    pub fn detect_handler(
        &self,
        prefix: &[u8],
        kind: Option<FormatKind>,
    ) -> Option<Arc<CodecHandler>> {
        let handlers = self.all();
        let window = handlers
            .iter()
            .map(|handler| handler.signature_window())
            .max()
            .unwrap_or(0);
        let prefix = &prefix[..prefix.len().min(window)];
        let found = detect_in(&handlers, prefix, kind).cloned();
        match &found {
            Some(handler) => debug!(format = %handler.name(), "format detected"),
            None => debug!(prefix_len = prefix.len(), "no format matched"),
        }
        found
    }

    /// Detect from a seekable stream, leaving its position unchanged.
    pub fn detect_from_reader<R: Read + Seek + ?Sized>(
        &self,
        reader: &mut R,
    ) -> std::io::Result<Option<FormatName>> {
        let prefix = read_prefix_and_rewind(reader, self.signature_window())?;
        Ok(self.detect(&prefix))
    }

    pub fn open_for_read<R: Read + Send + 'static>(
        &self,
        format: &str,
        reader: R,
        charset: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        let handler = self.get(format)?;
        decode_with(&handler, Box::new(reader), charset, options)
    }

    /// Detects the format from the stream itself, then opens it.
    ///
    /// The bytes consumed for detection are replayed ahead of the rest of
    /// the stream, so `reader` need not be seekable.
    pub fn open_for_read_auto<R: Read + Send + 'static>(
        &self,
        mut reader: R,
        charset: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<(FormatName, DecodedStream)> {
        let prefix = read_prefix(&mut reader, self.signature_window())?;
        let handler = self.detect_handler(&prefix, None).ok_or(Error::NoMatch)?;
        let replay = Cursor::new(prefix).chain(reader);
        let decoded = decode_with(&handler, Box::new(replay), charset, options)?;
        Ok((handler.name().clone(), decoded))
    }

    pub fn open_for_write<W: Write + Send + 'static>(
        &self,
        format: &str,
        writer: W,
        charset: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let handler = self.get(format)?;
        let Some(encoder) = handler.encoder() else {
            return Err(unsupported(&handler, Operation::Encode, "format is decode-only"));
        };
        if !handler.is_encode_available() {
            return Err(unsupported(&handler, Operation::Encode, "backend unavailable"));
        }
        encoder(Box::new(writer), charset, options)
    }
}

fn decode_with(
    handler: &CodecHandler,
    reader: Box<dyn Read + Send>,
    charset: Option<Charset>,
    options: &DecodeOptions,
) -> Result<DecodedStream> {
    let Some(decoder) = handler.decoder() else {
        return Err(unsupported(handler, Operation::Decode, "no decoder registered"));
    };
    if !handler.is_decode_available() {
        return Err(unsupported(handler, Operation::Decode, "backend unavailable"));
    }
    decoder(reader, charset, options)
}

fn unsupported(handler: &CodecHandler, operation: Operation, reason: &'static str) -> Error {
    Error::UnsupportedOperation {
        format: handler.name().clone(),
        operation,
        reason,
    }
}

/// Detect against the process-wide registry.
pub fn detect_format(prefix: &[u8]) -> Option<FormatName> {
    global().detect(prefix)
}

pub fn open_for_read<R: Read + Send + 'static>(
    format: &str,
    reader: R,
    charset: Option<Charset>,
    options: &DecodeOptions,
) -> Result<DecodedStream> {
    global().open_for_read(format, reader, charset, options)
}

pub fn open_for_write<W: Write + Send + 'static>(
    format: &str,
    writer: W,
    charset: Option<Charset>,
    options: &EncodeOptions,
) -> Result<EncodingStream> {
    global().open_for_write(format, writer, charset, options)
}
