//! Writing decoded archive entries to disk.
//!
//! Every entry name goes through [`resolve_entry_path_with`] before anything
//! is created, and every symlink target through [`resolve_symlink_target`].
//! Both checks are lexical, so before each write the existing part of the
//! destination is also resolved on disk and must stay below the real root.
//! Links planted by earlier entries therefore cannot redirect later writes.
//!
//! # Platform Behavior
//!
//! **Unix**: mode bits from the archive are applied according to the
//! selected [`PermissionStrategy`].
//!
//! **Windows**: permission handling is a no-op; symlinks are created as
//! file or directory links depending on the target.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entry::{ArchiveReader, DecodedStream, EntryKind, PendingEntry, Visit};
use crate::error::{Error, ErrorKind, Operation, Result};
use crate::format::{Charset, FormatName};
use crate::options::DecodeOptions;
use crate::registry::Registry;
use crate::sanitize::{resolve_entry_path_with, resolve_symlink_target};

/// What to do with an entry whose name escapes the root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EscapePolicy {
    /// Stop at the first escaping entry and return the error.
    #[default]
    Abort,
    /// Leave the entry out and record it in the report.
    Skip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Create links whose targets stay inside the root.
    #[default]
    Create,
    /// Never create links.
    Skip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionStrategy {
    /// Archive mode with at least owner read/write; `0o644` when absent.
    #[default]
    Standard,
    /// Archive mode verbatim when present.
    Preserve,
    /// Leave whatever the process umask produced.
    Ignore,
}

#[derive(Clone, Debug)]
pub struct Progress {
    pub entries_processed: usize,
    pub bytes_processed: u64,
    pub current_entry: String,
}

#[derive(Clone, Default)]
pub struct ExtractOptions {
    pub strip_components: usize,
    pub escape_policy: EscapePolicy,
    pub symlink_policy: SymlinkPolicy,
    pub permission_strategy: PermissionStrategy,
    pub on_progress: Option<Arc<dyn Fn(Progress) + Send + Sync>>,
}

impl ExtractOptions {
    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    pub fn escape_policy(mut self, policy: EscapePolicy) -> Self {
        self.escape_policy = policy;
        self
    }

    pub fn symlink_policy(mut self, policy: SymlinkPolicy) -> Self {
        self.symlink_policy = policy;
        self
    }

    pub fn permission_strategy(mut self, strategy: PermissionStrategy) -> Self {
        self.permission_strategy = strategy;
        self
    }

    pub fn on_progress(mut self, callback: Arc<dyn Fn(Progress) + Send + Sync>) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("strip_components", &self.strip_components)
            .field("escape_policy", &self.escape_policy)
            .field("symlink_policy", &self.symlink_policy)
            .field("permission_strategy", &self.permission_strategy)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub entry: String,
    pub target_path: PathBuf,
    pub size: u64,
    pub mode: Option<u32>,
    pub kind: EntryKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    PathEscape,
    SymlinkEscape,
    /// `strip_components` consumed the whole name.
    StrippedAway,
    SymlinkPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub entry: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug)]
pub struct ExtractReport {
    pub format: FormatName,
    pub total_bytes: u64,
    pub entries: Vec<ExtractedEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Extract every entry of `archive` below `root`.
pub fn extract(
    archive: &mut dyn ArchiveReader,
    root: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    let root = root.as_ref();
    let format = archive.format().clone();
    ensure_directory(root)?;
    let real_root = fs::canonicalize(root).map_err(|source| Error::Extraction {
        path: root.to_path_buf(),
        source,
    })?;

    let mut report = ExtractReport {
        format: format.clone(),
        total_bytes: 0,
        entries: Vec::new(),
        skipped: Vec::new(),
    };

    archive.for_each_entry(&mut |mut pending| {
        if pending.name.is_empty() {
            return Err(Error::format(
                &format,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("entry {} has no name", pending.index),
                ),
            ));
        }

        match extract_entry(&mut pending, root, &real_root, options)? {
            Outcome::Written(entry) => {
                report.total_bytes += entry.size;
                report.entries.push(entry);
            }
            Outcome::Skipped(reason) => {
                report.skipped.push(SkippedEntry {
                    entry: pending.name.clone(),
                    reason,
                });
            }
        }

        if let Some(callback) = &options.on_progress {
            callback(Progress {
                entries_processed: report.entries.len() + report.skipped.len(),
                bytes_processed: report.total_bytes,
                current_entry: pending.name.clone(),
            });
        }
        Ok(Visit::Continue)
    })?;

    info!(
        format = %report.format,
        entries = report.entries.len(),
        skipped = report.skipped.len(),
        bytes = report.total_bytes,
        "extraction finished"
    );
    Ok(report)
}

/// Detect, open and extract in one go.
///
/// One compression layer is peeled off first, so `.tar.gz` and friends work.
pub fn extract_from_reader<R: Read + Send + 'static>(
    registry: &Registry,
    reader: R,
    root: impl AsRef<Path>,
    charset: Option<Charset>,
    decode_options: &DecodeOptions,
    options: &ExtractOptions,
) -> Result<ExtractReport> {
    let mut archive = open_archive(registry, reader, charset, decode_options)?;
    extract(archive.as_mut(), root, options)
}

/// Auto-detect an archive, looking through at most one compressor.
pub fn open_archive<R: Read + Send + 'static>(
    registry: &Registry,
    reader: R,
    charset: Option<Charset>,
    options: &DecodeOptions,
) -> Result<Box<dyn ArchiveReader>> {
    let (outer, decoded) = registry.open_for_read_auto(reader, charset, options)?;
    let inner = match decoded {
        DecodedStream::Entries(archive) => return Ok(archive),
        DecodedStream::Bytes(inner) => inner,
    };
    debug!(format = %outer, "looking for an archive inside compressed stream");
    match registry.open_for_read_auto(inner, charset, options)? {
        (_, DecodedStream::Entries(archive)) => Ok(archive),
        (format, DecodedStream::Bytes(_)) => Err(Error::UnsupportedOperation {
            format,
            operation: Operation::Decode,
            reason: "stream is not an archive",
        }),
    }
}

enum Outcome {
    Written(ExtractedEntry),
    Skipped(SkipReason),
}

fn extract_entry(
    pending: &mut PendingEntry<'_>,
    root: &Path,
    real_root: &Path,
    options: &ExtractOptions,
) -> Result<Outcome> {
    let resolved = match resolve_entry_path_with(root, &pending.name, options.strip_components) {
        Ok(resolved) => resolved,
        Err(Error::NoComponentsRemaining { .. }) => {
            debug!(entry = %pending.name, "entry stripped away");
            return Ok(Outcome::Skipped(SkipReason::StrippedAway));
        }
        Err(err) => return escape(err, &pending.name, SkipReason::PathEscape, options),
    };
    let target = resolved.resolved;
    let parent = target.parent().unwrap_or(root);

    match &pending.kind {
        EntryKind::File => {
            if let Err(err) = confine(real_root, parent) {
                return escape(err, &pending.name, SkipReason::SymlinkEscape, options);
            }
            write_file(pending.data, &target)?;
            apply_permissions(&target, pending.mode, options.permission_strategy)?;
        }
        EntryKind::Directory => {
            if let Err(err) = confine(real_root, &target) {
                return escape(err, &pending.name, SkipReason::SymlinkEscape, options);
            }
            ensure_directory(&target)?;
        }
        EntryKind::Symlink { target: link_target } => {
            if options.symlink_policy == SymlinkPolicy::Skip {
                debug!(entry = %pending.name, "symlink skipped by policy");
                return Ok(Outcome::Skipped(SkipReason::SymlinkPolicy));
            }
            let checked = confine(real_root, parent).and_then(|real_parent| {
                let real_link = match target.file_name() {
                    Some(name) => real_parent.join(name),
                    None => real_parent,
                };
                resolve_symlink_target(real_root, &real_link, link_target)
            });
            if let Err(err) = checked {
                return escape(err, &pending.name, SkipReason::SymlinkEscape, options);
            }
            write_symlink(Path::new(link_target), &target)?;
        }
    }

    Ok(Outcome::Written(ExtractedEntry {
        entry: pending.name.clone(),
        target_path: target,
        size: pending.size,
        mode: pending.mode,
        kind: pending.kind.clone(),
    }))
}

fn escape(
    err: Error,
    entry: &str,
    reason: SkipReason,
    options: &ExtractOptions,
) -> Result<Outcome> {
    if err.kind() == ErrorKind::PathEscape && options.escape_policy == EscapePolicy::Skip {
        warn!(entry, error = %err, "skipping entry outside extraction root");
        return Ok(Outcome::Skipped(reason));
    }
    Err(err)
}

/// Resolve the deepest existing ancestor of `path` on disk and require it
/// to sit below `real_root`. Returns that ancestor joined with the
/// not-yet-created remainder.
fn confine(real_root: &Path, path: &Path) -> Result<PathBuf> {
    let existing = path
        .ancestors()
        .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())
        .unwrap_or(path);
    let real = fs::canonicalize(existing).map_err(|_| Error::SymlinkEscape {
        target: path.to_path_buf(),
        resolved: existing.to_path_buf(),
    })?;
    if !real.starts_with(real_root) {
        return Err(Error::SymlinkEscape {
            target: path.to_path_buf(),
            resolved: real,
        });
    }
    match path.strip_prefix(existing) {
        Ok(rest) if !rest.as_os_str().is_empty() => Ok(real.join(rest)),
        _ => Ok(real),
    }
}

fn write_file(data: &mut dyn Read, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        ensure_directory(parent)?;
    }
    // replace a link left by an earlier entry rather than writing through it
    if fs::symlink_metadata(target).is_ok_and(|meta| meta.file_type().is_symlink()) {
        fs::remove_file(target).map_err(|source| Error::Extraction {
            path: target.to_path_buf(),
            source,
        })?;
    }
    let mut file = fs::File::create(target).map_err(|source| Error::Extraction {
        path: target.to_path_buf(),
        source,
    })?;
    io::copy(data, &mut file).map_err(|source| Error::Extraction {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path).map_err(|source| Error::Extraction {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_permissions(path: &Path, mode: Option<u32>, strategy: PermissionStrategy) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match (strategy, mode) {
        (PermissionStrategy::Ignore, _) | (PermissionStrategy::Preserve, None) => return Ok(()),
        (PermissionStrategy::Preserve, Some(mode)) => mode & 0o7777,
        (PermissionStrategy::Standard, Some(mode)) => (mode & 0o777) | 0o600,
        (PermissionStrategy::Standard, None) => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        Error::Extraction {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn apply_permissions(
    _path: &Path,
    _mode: Option<u32>,
    _strategy: PermissionStrategy,
) -> Result<()> {
    Ok(())
}

fn write_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        ensure_directory(parent)?;
    }
    create_symlink(target, link).map_err(|source| Error::Extraction {
        path: link.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    use std::os::windows::fs;
    let pointee = link.parent().map(|parent| parent.join(target));
    if pointee.is_some_and(|p| p.is_dir()) || target.to_string_lossy().ends_with('/') {
        fs::symlink_dir(target, link)
    } else {
        fs::symlink_file(target, link)
    }
}
