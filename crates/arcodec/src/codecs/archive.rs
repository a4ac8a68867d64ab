//! Built-in archive containers.
//!
//! zip (and jar, which reuses it) and tar have backends; the remaining
//! containers are registered for detection only.

use super::archive_handler as archive;
use crate::format::names;
use crate::handler::CodecHandler;
use crate::registry::RegistryConfig;
use crate::signature::{
    Signature, DUMP_WINDOW, USTAR_WINDOW, is_ar, is_arj, is_cpio, is_dump, is_seven_z, is_ustar,
    is_zip,
};

pub(super) fn handlers(config: &RegistryConfig) -> Vec<CodecHandler> {
    vec![
        zip(config),
        archive(names::AR, config)
            .signature(Signature::magic(8, is_ar))
            .build(),
        archive(names::ARJ, config)
            .signature(Signature::magic(2, is_arj))
            .build(),
        archive(names::CPIO, config)
            .signature(Signature::magic(6, is_cpio))
            .build(),
        archive(names::DUMP, config)
            .signature(Signature::magic(DUMP_WINDOW, is_dump))
            .build(),
        archive(names::SEVEN_Z, config)
            .signature(Signature::magic(6, is_seven_z))
            .build(),
        tar(config),
        jar(config),
    ]
}

fn zip(config: &RegistryConfig) -> CodecHandler {
    let handler = archive(names::ZIP, config).signature(Signature::magic(4, is_zip));
    #[cfg(feature = "zip")]
    let handler = handler.decoder(zip_backend::decode_zip).encoder(zip_backend::encode_zip);
    handler.backend_compiled(cfg!(feature = "zip")).build()
}

/// Same bytes as zip; never auto-detected so zip always wins.
fn jar(config: &RegistryConfig) -> CodecHandler {
    let handler = archive(names::JAR, config);
    #[cfg(feature = "zip")]
    let handler = handler.decoder(zip_backend::decode_jar).encoder(zip_backend::encode_jar);
    handler.backend_compiled(cfg!(feature = "zip")).build()
}

fn tar(config: &RegistryConfig) -> CodecHandler {
    let mut handler =
        archive(names::TAR, config).signature(Signature::magic(USTAR_WINDOW, is_ustar));
    if let Some(heuristic) = config.tar_heuristic {
        handler = handler.signature(heuristic.into_signature());
    }
    #[cfg(feature = "tar")]
    let handler = handler.decoder(tar_backend::decode).encoder(tar_backend::encode);
    handler.backend_compiled(cfg!(feature = "tar")).build()
}

#[cfg(feature = "zip")]
mod zip_backend {
    use std::io::{self, Cursor, Read, Write};
    use std::mem;

    use tracing::{debug, warn};
    use zip::result::ZipError;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipArchive, ZipWriter};

    use crate::entry::{
        ArchiveReader, ArchiveWriter, DecodedStream, EncodingStream, EntryKind, PendingEntry,
        Visit, name_or_default,
    };
    use crate::detect::read_prefix;
    use crate::error::{Error, Result};
    use crate::format::{Charset, FormatName, decode_name, names};
    use crate::options::{DecodeOptions, EncodeOptions};

    const LOCAL_HEADER_MAGIC: &[u8] = b"PK\x03\x04";
    const LOCAL_HEADER_LEN: usize = 30;
    const DATA_DESCRIPTOR_FLAG: u16 = 0x0008;
    const SYMLINK_TARGET_LIMIT: u64 = 4096;
    const S_IFMT: u32 = 0o170000;
    const S_IFLNK: u32 = 0o120000;

    pub(super) fn decode_zip(
        reader: Box<dyn Read + Send>,
        charset: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Entries(Box::new(ZipEntries::new(names::ZIP, reader, charset, options))))
    }

    pub(super) fn decode_jar(
        reader: Box<dyn Read + Send>,
        charset: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        Ok(DecodedStream::Entries(Box::new(ZipEntries::new(names::JAR, reader, charset, options))))
    }

    pub(super) fn encode_zip(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        Ok(EncodingStream::Entries(Box::new(ZipEntryWriter::new(names::ZIP, writer, options))))
    }

    pub(super) fn encode_jar(
        writer: Box<dyn Write + Send>,
        _: Option<Charset>,
        options: &EncodeOptions,
    ) -> Result<EncodingStream> {
        Ok(EncodingStream::Entries(Box::new(ZipEntryWriter::new(names::JAR, writer, options))))
    }

    struct ZipHeader {
        raw_name: Vec<u8>,
        name: String,
        mode: Option<u32>,
        size: u64,
        is_dir: bool,
    }

    macro_rules! header_of {
        ($file:expr) => {
            ZipHeader {
                raw_name: $file.name_raw().to_vec(),
                name: $file.name().to_owned(),
                mode: $file.unix_mode(),
                size: $file.size(),
                is_dir: $file.is_dir(),
            }
        };
    }

    fn is_symlink(mode: Option<u32>) -> bool {
        mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
    }

    /// Streams local file headers without touching the central directory.
    ///
    /// Entries whose sizes trail their data (general purpose flag bit 3)
    /// cannot be streamed; when the first local header carries that flag the
    /// whole archive is buffered, within the memory limit, and read through
    /// its central directory instead.
    struct ZipEntries {
        reader: Box<dyn Read + Send>,
        context: Context,
    }

    struct Context {
        format: FormatName,
        charset: Option<Charset>,
        options: DecodeOptions,
    }

    impl ZipEntries {
        fn new(
            format: FormatName,
            reader: Box<dyn Read + Send>,
            charset: Option<Charset>,
            options: &DecodeOptions,
        ) -> Self {
            Self {
                reader,
                context: Context {
                    format,
                    charset,
                    options: *options,
                },
            }
        }

        /// Peek the first local header and put it back in front of the stream.
        fn starts_with_data_descriptor(&mut self) -> Result<bool> {
            let head = read_prefix(&mut self.reader, LOCAL_HEADER_LEN)?;
            let deferred = head.len() >= 8
                && head.starts_with(LOCAL_HEADER_MAGIC)
                && u16::from_le_bytes([head[6], head[7]]) & DATA_DESCRIPTOR_FLAG != 0;
            let rest = mem::replace(&mut self.reader, Box::new(io::empty()));
            self.reader = Box::new(Cursor::new(head).chain(rest));
            Ok(deferred)
        }

        fn buffer(&mut self) -> Result<Vec<u8>> {
            let mut buffer = Vec::new();
            let Some(limit) = self.context.options.max_memory_limit_bytes() else {
                self.reader.read_to_end(&mut buffer)?;
                return Ok(buffer);
            };
            (&mut self.reader)
                .take(limit.saturating_add(1))
                .read_to_end(&mut buffer)?;
            if buffer.len() as u64 > limit {
                return Err(Error::format(
                    &self.context.format,
                    io::Error::new(
                        io::ErrorKind::OutOfMemory,
                        format!("archive with data descriptors exceeds {limit} bytes"),
                    ),
                ));
            }
            Ok(buffer)
        }

        fn stream(
            &mut self,
            visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
        ) -> Result<()> {
            let context = &self.context;
            let mut index = 0usize;
            loop {
                let mut file = match zip::read::read_zipfile_from_stream(&mut self.reader) {
                    Ok(Some(file)) => file,
                    Ok(None) => return Ok(()),
                    Err(err) => return context.damaged(index, err),
                };
                let header = header_of!(file);
                if context.visit(header, &mut file, index, visitor)? == Visit::Stop {
                    return Ok(());
                }
                index += 1;
            }
        }

        fn buffered(
            &mut self,
            visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
        ) -> Result<()> {
            let buffer = self.buffer()?;
            let context = &self.context;
            debug!(
                format = %context.format,
                bytes = buffer.len(),
                "buffered archive with data descriptors"
            );
            let mut archive = match ZipArchive::new(Cursor::new(buffer)) {
                Ok(archive) => archive,
                Err(err) => return context.damaged(0, err),
            };
            for index in 0..archive.len() {
                let mut file = match archive.by_index(index) {
                    Ok(file) => file,
                    Err(err) => return context.damaged(index, err),
                };
                let header = header_of!(file);
                if context.visit(header, &mut file, index, visitor)? == Visit::Stop {
                    break;
                }
            }
            Ok(())
        }
    }

    impl Context {
        fn damaged(&self, index: usize, err: ZipError) -> Result<()> {
            if self.options.try_to_recover_broken_archives() {
                warn!(format = %self.format, index, error = %err, "stopping at damaged entry");
                return Ok(());
            }
            Err(Error::format(&self.format, err))
        }

        fn visit(
            &self,
            header: ZipHeader,
            data: &mut dyn Read,
            index: usize,
            visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
        ) -> Result<Visit> {
            let name = match self.charset {
                Some(charset) => decode_name(&header.raw_name, Some(charset)),
                None => header.name,
            };
            let name = name_or_default(name, index, &self.options);

            let kind = if header.is_dir {
                EntryKind::Directory
            } else if is_symlink(header.mode) {
                let mut raw = Vec::new();
                (&mut *data).take(SYMLINK_TARGET_LIMIT).read_to_end(&mut raw)?;
                EntryKind::Symlink {
                    target: decode_name(&raw, self.charset),
                }
            } else {
                EntryKind::File
            };

            debug!(format = %self.format, index, entry = %name, "zip entry");
            visitor(PendingEntry {
                index,
                name,
                size: header.size,
                mode: header.mode.map(|mode| mode & 0o7777),
                kind,
                data,
            })
        }
    }

    impl ArchiveReader for ZipEntries {
        fn format(&self) -> &FormatName {
            &self.context.format
        }

        fn for_each_entry(
            &mut self,
            visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
        ) -> Result<()> {
            if self.starts_with_data_descriptor()? {
                self.buffered(visitor)
            } else {
                self.stream(visitor)
            }
        }
    }

    /// The archive is assembled in memory so local headers carry real
    /// sizes instead of trailing data descriptors.
    struct ZipEntryWriter {
        format: FormatName,
        zip: ZipWriter<Cursor<Vec<u8>>>,
        output: Box<dyn Write + Send>,
        level: i64,
    }

    impl ZipEntryWriter {
        fn new(format: FormatName, output: Box<dyn Write + Send>, options: &EncodeOptions) -> Self {
            Self {
                format,
                zip: ZipWriter::new(Cursor::new(Vec::new())),
                output,
                level: i64::from(options.level_in(0, 9, 6)),
            }
        }

        fn file_options(&self, mode: u32, large: bool) -> SimpleFileOptions {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(self.level))
                .unix_permissions(mode)
                .large_file(large)
        }
    }

    impl ArchiveWriter for ZipEntryWriter {
        fn format(&self) -> &FormatName {
            &self.format
        }

        fn append_file(
            &mut self,
            name: &str,
            mode: Option<u32>,
            size: u64,
            data: &mut dyn Read,
        ) -> Result<()> {
            let options = self.file_options(mode.unwrap_or(0o644), size > u64::from(u32::MAX));
            self.zip
                .start_file(name.to_owned(), options)
                .map_err(|err| Error::format(&self.format, err))?;
            io::copy(data, &mut self.zip)?;
            Ok(())
        }

        fn append_dir(&mut self, name: &str, mode: Option<u32>) -> Result<()> {
            let options = self.file_options(mode.unwrap_or(0o755), false);
            self.zip
                .add_directory(name.to_owned(), options)
                .map_err(|err| Error::format(&self.format, err))?;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            let Self {
                format,
                zip,
                mut output,
                ..
            } = *self;
            let buffer = zip.finish().map_err(|err| Error::format(&format, err))?;
            output.write_all(buffer.get_ref())?;
            output.flush()?;
            Ok(())
        }
    }
}

#[cfg(feature = "tar")]
mod tar_backend {
    use std::io::{self, Read, Write};
    use std::path::PathBuf;

    use tar::{Archive, Builder, EntryType, Header};
    use tracing::{debug, warn};

    use crate::entry::{
        ArchiveReader, ArchiveWriter, DecodedStream, EncodingStream, EntryKind, PendingEntry,
        Visit, name_or_default,
    };
    use crate::error::{Error, Result};
    use crate::format::{Charset, FormatName, decode_name, names};
    use crate::options::{DecodeOptions, EncodeOptions};

    pub(super) fn decode(
        reader: Box<dyn Read + Send>,
        charset: Option<Charset>,
        options: &DecodeOptions,
    ) -> Result<DecodedStream> {
        let mut archive = Archive::new(reader);
        archive.set_ignore_zeros(options.try_to_recover_broken_archives());
        Ok(DecodedStream::Entries(Box::new(TarEntries {
            format: names::TAR,
            archive,
            charset,
            options: *options,
        })))
    }

    pub(super) fn encode(
        writer: Box<dyn Write + Send>,
        charset: Option<Charset>,
        _: &EncodeOptions,
    ) -> Result<EncodingStream> {
        Ok(EncodingStream::Entries(Box::new(TarEntryWriter {
            format: names::TAR,
            builder: Builder::new(writer),
            charset,
        })))
    }

    struct TarEntries {
        format: FormatName,
        archive: Archive<Box<dyn Read + Send>>,
        charset: Option<Charset>,
        options: DecodeOptions,
    }

    impl ArchiveReader for TarEntries {
        fn format(&self) -> &FormatName {
            &self.format
        }

        fn for_each_entry(
            &mut self,
            visitor: &mut dyn FnMut(PendingEntry<'_>) -> Result<Visit>,
        ) -> Result<()> {
            let entries = self
                .archive
                .entries()
                .map_err(|err| Error::format(&self.format, err))?;

            for (index, entry) in entries.enumerate() {
                let mut entry = match entry {
                    Ok(entry) => entry,
                    Err(err) if self.options.try_to_recover_broken_archives() => {
                        warn!(
                            format = %self.format,
                            index,
                            error = %err,
                            "stopping at damaged entry"
                        );
                        return Ok(());
                    }
                    Err(err) => return Err(Error::format(&self.format, err)),
                };

                let entry_type = entry.header().entry_type();
                let mode = entry.header().mode().ok();
                let name = decode_name(&entry.path_bytes(), self.charset);
                let name = name_or_default(name, index, &self.options);

                let kind = if entry_type.is_dir() {
                    EntryKind::Directory
                } else if entry_type.is_symlink() {
                    let target = entry
                        .link_name_bytes()
                        .map(|raw| decode_name(&raw, self.charset))
                        .unwrap_or_default();
                    EntryKind::Symlink { target }
                } else if entry_type.is_file() || entry_type.is_contiguous() {
                    EntryKind::File
                } else {
                    debug!(
                        format = %self.format,
                        entry = %name,
                        ?entry_type,
                        "skipping special entry"
                    );
                    continue;
                };

                let size = entry.size();
                let visit = visitor(PendingEntry {
                    index,
                    name,
                    size,
                    mode,
                    kind,
                    data: &mut entry,
                })?;
                if visit == Visit::Stop {
                    break;
                }
            }
            Ok(())
        }
    }

    struct TarEntryWriter {
        format: FormatName,
        builder: Builder<Box<dyn Write + Send>>,
        charset: Option<Charset>,
    }

    impl TarEntryWriter {
        /// Entry path with the name encoded in the requested charset.
        fn path(&self, name: &str) -> PathBuf {
            #[cfg(unix)]
            if let Some(charset) = self.charset {
                use std::ffi::OsStr;
                use std::os::unix::ffi::OsStrExt;
                let (encoded, _, _) = charset.encode(name);
                return PathBuf::from(OsStr::from_bytes(&encoded));
            }
            PathBuf::from(name)
        }

        fn append(&mut self, header: &mut Header, name: &str, data: &mut dyn Read) -> Result<()> {
            let path = self.path(name);
            self.builder
                .append_data(header, path, data)
                .map_err(|err| Error::format(&self.format, err))
        }
    }

    impl ArchiveWriter for TarEntryWriter {
        fn format(&self) -> &FormatName {
            &self.format
        }

        fn append_file(
            &mut self,
            name: &str,
            mode: Option<u32>,
            size: u64,
            data: &mut dyn Read,
        ) -> Result<()> {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(size);
            header.set_mode(mode.unwrap_or(0o644));
            self.append(&mut header, name, data)
        }

        fn append_dir(&mut self, name: &str, mode: Option<u32>) -> Result<()> {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(mode.unwrap_or(0o755));
            self.append(&mut header, name, &mut io::empty())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            let Self {
                format, builder, ..
            } = *self;
            let mut output = builder
                .into_inner()
                .map_err(|err| Error::format(&format, err))?;
            output.flush()?;
            Ok(())
        }
    }
}
