//! Codec handler records.
//!
//! A handler is plain data: a name, a kind, zero or more signatures and the
//! factories that open streams. Built-in and pluggable codecs use the same
//! record; nothing is subclassed.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::entry::{DecodedStream, EncodingStream};
use crate::error::Result;
use crate::format::{Charset, FormatKind, FormatName};
use crate::options::{DecodeOptions, EncodeOptions};
use crate::probe::{Availability, CapabilityProbe, DEFAULT_PROBE_TIMEOUT};
use crate::signature::{MatchStrength, Signature};

pub type DecodeFn = dyn Fn(
        Box<dyn Read + Send>,
        Option<Charset>,
        &DecodeOptions,
    ) -> Result<DecodedStream>
    + Send
    + Sync;

pub type EncodeFn = dyn Fn(
        Box<dyn Write + Send>,
        Option<Charset>,
        &EncodeOptions,
    ) -> Result<EncodingStream>
    + Send
    + Sync;

/// Static facts about a handler plus its current availability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub name: FormatName,
    pub kind: FormatKind,
    pub detectable: bool,
    pub can_encode: bool,
    pub decode_available: bool,
    pub encode_available: bool,
}

pub struct CodecHandler {
    name: FormatName,
    kind: FormatKind,
    signatures: Vec<Signature>,
    decoder: Option<Arc<DecodeFn>>,
    encoder: Option<Arc<EncodeFn>>,
    decode_availability: Availability,
    encode_availability: Availability,
}

impl CodecHandler {
    pub fn builder(name: FormatName, kind: FormatKind) -> CodecHandlerBuilder {
        CodecHandlerBuilder {
            name,
            kind,
            signatures: Vec::new(),
            decoder: None,
            encoder: None,
            decode_probe: None,
            encode_probe: None,
            backend_compiled: true,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn name(&self) -> &FormatName {
        &self.name
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Whether auto-detection can ever produce this format.
    pub fn is_detectable(&self) -> bool {
        !self.signatures.is_empty()
    }

    /// Largest number of leading bytes any of the signatures inspects.
    pub fn signature_window(&self) -> usize {
        self.signatures.iter().map(Signature::window).max().unwrap_or(0)
    }

    pub fn matches(&self, prefix: &[u8]) -> bool {
        self.signatures.iter().any(|sig| sig.matches(prefix))
    }

    pub(crate) fn matches_with(&self, prefix: &[u8], strength: MatchStrength) -> bool {
        self.signatures
            .iter()
            .filter(|sig| sig.strength() == strength)
            .any(|sig| sig.matches(prefix))
    }

    /// Structural: an encoder exists for this format at all.
    pub fn can_encode(&self) -> bool {
        self.encoder.is_some()
    }

    /// May probe an optional backend on first call.
    pub fn is_decode_available(&self) -> bool {
        self.decoder.is_some() && self.decode_availability.get()
    }

    pub fn is_encode_available(&self) -> bool {
        self.encoder.is_some() && self.encode_availability.get()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: self.name.clone(),
            kind: self.kind,
            detectable: self.is_detectable(),
            can_encode: self.can_encode(),
            decode_available: self.is_decode_available(),
            encode_available: self.is_encode_available(),
        }
    }

    pub(crate) fn decoder(&self) -> Option<&DecodeFn> {
        self.decoder.as_deref()
    }

    pub(crate) fn encoder(&self) -> Option<&EncodeFn> {
        self.encoder.as_deref()
    }
}

impl fmt::Debug for CodecHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecHandler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("signatures", &self.signatures)
            .field("decoder", &self.decoder.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("decode_availability", &self.decode_availability)
            .field("encode_availability", &self.encode_availability)
            .finish()
    }
}

pub struct CodecHandlerBuilder {
    name: FormatName,
    kind: FormatKind,
    signatures: Vec<Signature>,
    decoder: Option<Arc<DecodeFn>>,
    encoder: Option<Arc<EncodeFn>>,
    decode_probe: Option<Arc<dyn CapabilityProbe>>,
    encode_probe: Option<Arc<dyn CapabilityProbe>>,
    backend_compiled: bool,
    probe_timeout: Duration,
}

impl CodecHandlerBuilder {
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signatures.push(signature);
        self
    }

    pub fn decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(Box<dyn Read + Send>, Option<Charset>, &DecodeOptions) -> Result<DecodedStream>
            + Send
            + Sync
            + 'static,
    {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(Box<dyn Write + Send>, Option<Charset>, &EncodeOptions) -> Result<EncodingStream>
            + Send
            + Sync
            + 'static,
    {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// Decoding needs a backend that has to be probed at runtime.
    pub fn decode_probe(mut self, probe: Arc<dyn CapabilityProbe>) -> Self {
        self.decode_probe = Some(probe);
        self
    }

    pub fn encode_probe(mut self, probe: Arc<dyn CapabilityProbe>) -> Self {
        self.encode_probe = Some(probe);
        self
    }

    /// `false` when the backend was compiled out; both directions report
    /// unavailable while the handler stays detectable.
    pub fn backend_compiled(mut self, compiled: bool) -> Self {
        self.backend_compiled = compiled;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn build(self) -> CodecHandler {
        let availability = |probe: Option<Arc<dyn CapabilityProbe>>, direction: &str| match probe {
            Some(probe) if self.backend_compiled => Availability::probed(
                format!("{}-{direction}", self.name),
                probe,
                self.probe_timeout,
            ),
            _ => Availability::fixed(self.backend_compiled),
        };
        let decode_availability = availability(self.decode_probe.clone(), "decode");
        let encode_availability = availability(self.encode_probe.clone(), "encode");

        CodecHandler {
            name: self.name,
            kind: self.kind,
            signatures: self.signatures,
            decoder: self.decoder,
            encoder: self.encoder,
            decode_availability,
            encode_availability,
        }
    }
}
