//! Built-in compressors.
//!
//! Each backend crate is behind a cargo feature. With the feature off the
//! handler is still registered for detection and reports itself unavailable.

use super::{compressor, pack200};
use crate::format::names;
use crate::handler::CodecHandler;
use crate::registry::RegistryConfig;
use crate::signature::{
    Signature, is_bzip2, is_deflate, is_gzip, is_lz4_framed, is_lzma, is_snappy_framed, is_xz,
    is_z, is_zstd,
};

pub(super) fn handlers(config: &RegistryConfig) -> Vec<CodecHandler> {
    vec![
        bzip2(config),
        gzip(config),
        pack200::handler(config),
        compressor(names::SNAPPY_FRAMED, config)
            .signature(Signature::magic(10, is_snappy_framed))
            .build(),
        compressor(names::Z, config)
            .signature(Signature::magic(4, is_z))
            .build(),
        deflate(config),
        xz(config),
        lzma(config),
        compressor(names::LZ4_FRAMED, config)
            .signature(Signature::magic(4, is_lz4_framed))
            .build(),
        zstd(config),
        brotli(config),
        compressor(names::DEFLATE64, config).build(),
        compressor(names::LZ4_BLOCK, config).build(),
        compressor(names::SNAPPY_RAW, config).build(),
    ]
}

fn bzip2(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::BZIP2, config).signature(Signature::magic(3, is_bzip2));
    #[cfg(feature = "bzip2")]
    let handler = handler.decoder(bz::decode).encoder(bz::encode);
    handler.backend_compiled(cfg!(feature = "bzip2")).build()
}

fn gzip(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::GZIP, config).signature(Signature::magic(2, is_gzip));
    #[cfg(feature = "gzip")]
    let handler = handler.decoder(gz::decode_gzip).encoder(gz::encode_gzip);
    handler.backend_compiled(cfg!(feature = "gzip")).build()
}

fn deflate(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::DEFLATE, config).signature(Signature::magic(4, is_deflate));
    #[cfg(feature = "gzip")]
    let handler = handler.decoder(gz::decode_zlib).encoder(gz::encode_zlib);
    handler.backend_compiled(cfg!(feature = "gzip")).build()
}

fn xz(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::XZ, config).signature(Signature::magic(6, is_xz));
    #[cfg(feature = "xz")]
    let handler = handler.decoder(lz::decode_xz).encoder(lz::encode_xz);
    handler.backend_compiled(cfg!(feature = "xz")).build()
}

fn lzma(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::LZMA, config).signature(Signature::magic(3, is_lzma));
    #[cfg(feature = "xz")]
    let handler = handler.decoder(lz::decode_lzma).encoder(lz::encode_lzma);
    handler.backend_compiled(cfg!(feature = "xz")).build()
}

fn zstd(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::ZSTD, config).signature(Signature::magic(4, is_zstd));
    #[cfg(feature = "zstd")]
    let handler = handler.decoder(zst::decode).encoder(zst::encode);
    handler.backend_compiled(cfg!(feature = "zstd")).build()
}

/// Brotli has no magic bytes; it is only reachable by name.
fn brotli(config: &RegistryConfig) -> CodecHandler {
    let handler = compressor(names::BROTLI, config);
    #[cfg(feature = "brotli")]
    let handler = handler.decoder(br::decode).encoder(br::encode);
    handler.backend_compiled(cfg!(feature = "brotli")).build()
}

#[cfg(any(
    feature = "gzip",
    feature = "bzip2",
    feature = "xz",
    feature = "zstd",
    feature = "brotli"
))]
mod finish {
    use std::io::{self, Write};

    use crate::entry::CompressWriter;

    /// Adapts an encoder whose trailer is written by a consuming `finish`.
    pub(super) struct Finisher<E> {
        inner: E,
        close: fn(E) -> io::Result<()>,
    }

    impl<E: Write + Send + 'static> Finisher<E> {
        pub(super) fn boxed(inner: E, close: fn(E) -> io::Result<()>) -> Box<dyn CompressWriter> {
            Box::new(Self { inner, close })
        }
    }

    impl<E: Write> Write for Finisher<E> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl<E: Write + Send> CompressWriter for Finisher<E> {
        fn finish(self: Box<Self>) -> io::Result<()> {
            let Finisher { inner, close } = *self;
            close(inner)
        }
    }
}

#[cfg(any(
    feature = "gzip",
    feature = "bzip2",
    feature = "xz",
    feature = "zstd",
    feature = "brotli"
))]
use finish::Finisher;

#[cfg(any(feature = "xz", feature = "zstd"))]
fn log_limit(format: &str, limit: Option<u64>) {
    if let Some(bytes) = limit {
        tracing::debug!(format, bytes, "decoder memory limit applied");
    }
}

#[cfg(feature = "gzip")]
mod gz {
    use std::io::{Read, Write};

    use flate2::Compression;
    use flate2::read::{GzDecoder, MultiGzDecoder, ZlibDecoder};
    use flate2::write::{GzEncoder, ZlibEncoder};

    use super::Finisher;
    use crate::entry::{DecodedStream, EncodingStream};
    use crate::error::Result;
    use crate::format::Charset;
    use crate::options::{DecodeOptions, EncodeOptions};

    fn level(options: &EncodeOptions) -> Compression {
        Compression::new(options.level_in(0, 9, 6))
    }

    pub(super) fn decode_gzip(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Bytes(if options.decompress_concatenated() {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            Box::new(GzDecoder::new(reader))
        }))
    }

    pub(super) fn encode_gzip(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let encoder = GzEncoder::new(writer, level(options));
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }

    pub(super) fn decode_zlib(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        _: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Bytes(Box::new(ZlibDecoder::new(reader))))
    }

    pub(super) fn encode_zlib(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let encoder = ZlibEncoder::new(writer, level(options));
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }
}

#[cfg(feature = "bzip2")]
mod bz {
    use std::io::{Read, Write};

    use bzip2::Compression;
    use bzip2::read::{BzDecoder, MultiBzDecoder};
    use bzip2::write::BzEncoder;

    use super::Finisher;
    use crate::entry::{DecodedStream, EncodingStream};
    use crate::error::Result;
    use crate::format::Charset;
    use crate::options::{DecodeOptions, EncodeOptions};

    pub(super) fn decode(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Bytes(if options.decompress_concatenated() {
            Box::new(MultiBzDecoder::new(reader))
        } else {
            Box::new(BzDecoder::new(reader))
        }))
    }

    pub(super) fn encode(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let level = Compression::new(options.level_in(1, 9, 9));
        let encoder = BzEncoder::new(writer, level);
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }
}

#[cfg(feature = "xz")]
mod lz {
    use std::io::{self, Read, Write};

    use xz2::read::XzDecoder;
    use xz2::stream::{CONCATENATED, LzmaOptions, Stream};
    use xz2::write::XzEncoder;

    use super::{Finisher, log_limit};
    use crate::entry::{DecodedStream, EncodingStream};
    use crate::error::Result;
    use crate::format::Charset;
    use crate::options::{DecodeOptions, EncodeOptions};

    fn memlimit(options: &DecodeOptions, format: &str) -> u64 {
        let limit = options.max_memory_limit_bytes();
        log_limit(format, limit);
        limit.unwrap_or(u64::MAX)
    }

    fn preset(options: &EncodeOptions) -> u32 {
        options.level_in(0, 9, 6)
    }

    pub(super) fn decode_xz(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        let flags = if options.decompress_concatenated() { CONCATENATED } else { 0 };
        let stream = Stream::new_stream_decoder(memlimit(options, "xz"), flags)
            .map_err(io::Error::from)?;
        Ok(DecodedStream::Bytes(Box::new(XzDecoder::new_stream(reader, stream))))
    }

    pub(super) fn encode_xz(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let encoder = XzEncoder::new(writer, preset(options));
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }

    pub(super) fn decode_lzma(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        let stream = Stream::new_lzma_decoder(memlimit(options, "lzma")).map_err(io::Error::from)?;
        Ok(DecodedStream::Bytes(Box::new(XzDecoder::new_stream(reader, stream))))
    }

    pub(super) fn encode_lzma(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let lzma = LzmaOptions::new_preset(preset(options)).map_err(io::Error::from)?;
        let stream = Stream::new_lzma_encoder(&lzma).map_err(io::Error::from)?;
        let encoder = XzEncoder::new_stream(writer, stream);
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }
}

#[cfg(feature = "zstd")]
mod zst {
    use std::io::{Read, Write};

    use zstd::stream::read::Decoder;
    use zstd::stream::write::Encoder;

    use super::{Finisher, log_limit};
    use crate::entry::{DecodedStream, EncodingStream};
    use crate::error::Result;
    use crate::format::Charset;
    use crate::options::{DecodeOptions, EncodeOptions};

    const MIN_WINDOW_LOG: u32 = 10;
    const MAX_WINDOW_LOG: u32 = 31;

    /// Largest window whose buffer fits in `bytes`.
    pub(super) fn window_log_for(bytes: u64) -> u32 {
        let log = u64::BITS - 1 - bytes.max(1).leading_zeros();
        log.clamp(MIN_WINDOW_LOG, MAX_WINDOW_LOG)
    }

    pub(super) fn decode(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        let mut decoder = Decoder::new(reader)?;
        let limit = options.max_memory_limit_bytes();
        log_limit("zstd", limit);
        if let Some(bytes) = limit {
            decoder.window_log_max(window_log_for(bytes))?;
        }
        if !options.decompress_concatenated() {
            decoder = decoder.single_frame();
        }
        Ok(DecodedStream::Bytes(Box::new(decoder)))
    }

    pub(super) fn encode(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let level = options.level_in(1, 22, 3) as i32;
        let encoder = Encoder::new(writer, level)?;
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.finish()?.flush()
        })))
    }
}

#[cfg(feature = "brotli")]
mod br {
    use std::io::{Read, Write};

    use brotli::{CompressorWriter, Decompressor};

    use super::Finisher;
    use crate::entry::{DecodedStream, EncodingStream};
    use crate::error::Result;
    use crate::format::Charset;
    use crate::options::{DecodeOptions, EncodeOptions};

    const BUFFER_SIZE: usize = 4096;
    const LG_WINDOW: u32 = 22;

    pub(super) fn decode(
        reader: Box<dyn Read + Send>,
        _: Option<Charset>,
        _: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Bytes(Box::new(Decompressor::new(reader, BUFFER_SIZE))))
    }

    pub(super) fn encode(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        let quality = options.level_in(0, 11, 6);
        let encoder = CompressorWriter::new(writer, BUFFER_SIZE, quality, LG_WINDOW);
        Ok(EncodingStream::Bytes(Finisher::boxed(encoder, |e| {
            e.into_inner().flush()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{DecodeOptions, EncodeOptions};
    use crate::registry::Registry;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    /// Writer that hands its bytes back after the encoder is finished.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn compress(registry: &Registry, format: &str, data: &[u8]) -> Vec<u8> {
        let sink = Shared::default();
        let stream = registry
            .open_for_write(format, sink.clone(), None, &EncodeOptions::DEFAULT)
            .unwrap();
        let mut writer = stream.into_bytes().unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        let bytes = sink.0.lock().unwrap().clone();
        bytes
    }

    fn decompress(
        registry: &Registry,
        format: &str,
        data: Vec<u8>,
        options: &DecodeOptions,
    ) -> Vec<u8> {
        let stream = registry
            .open_for_read(format, io::Cursor::new(data), None, options)
            .unwrap();
        let mut out = Vec::new();
        stream.into_bytes().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn catalogue_order() {
        let names: Vec<_> = handlers(&RegistryConfig::default())
            .into_iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(&names[..3], ["bzip2", "gz", "pack200"]);
        assert_eq!(names.last().map(String::as_str), Some("snappy-raw"));
    }

    #[test]
    fn undecodable_formats_stay_detectable() {
        let registry = Registry::with_builtins();
        for name in ["z", "snappy-framed", "lz4-framed"] {
            let caps = registry.get(name).unwrap().capabilities();
            assert!(caps.detectable, "{name}");
            assert!(!caps.decode_available, "{name}");
            assert!(!caps.can_encode, "{name}");
        }
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_concatenated_members() {
        let registry = Registry::with_builtins();
        let mut joined = compress(&registry, "gz", b"first ");
        joined.extend(compress(&registry, "gz", b"second"));

        let single = decompress(&registry, "gz", joined.clone(), &DecodeOptions::DEFAULT);
        assert_eq!(single, b"first ");

        let options = DecodeOptions::builder()
            .with_decompress_concatenated(true)
            .build()
            .unwrap();
        assert_eq!(decompress(&registry, "gz", joined, &options), b"first second");
    }

    #[cfg(feature = "xz")]
    #[test]
    fn xz_memory_limit_is_enforced() {
        let registry = Registry::with_builtins();
        let data = vec![7u8; 64 * 1024];
        let packed = compress(&registry, "xz", &data);
        let tight = DecodeOptions::builder()
            .with_max_memory_limit_in_kb(1)
            .build()
            .unwrap();
        let stream = registry
            .open_for_read("xz", io::Cursor::new(packed), None, &tight)
            .unwrap();
        let mut out = Vec::new();
        assert!(stream.into_bytes().unwrap().read_to_end(&mut out).is_err());
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_window_from_limit() {
        assert_eq!(zst::window_log_for(1), 10);
        assert_eq!(zst::window_log_for(8 * 1024 * 1024), 23);
        assert_eq!(zst::window_log_for(u64::MAX), 31);
    }

    #[cfg(feature = "brotli")]
    #[test]
    fn brotli_by_name_only() {
        let registry = Registry::with_builtins();
        let packed = compress(&registry, "br", b"hello brotli");
        assert!(!registry.get("br").unwrap().is_detectable());
        assert_eq!(decompress(&registry, "br", packed, &DecodeOptions::DEFAULT), b"hello brotli");
    }
}
