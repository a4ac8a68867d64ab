//! Content signatures.
//!
//! # Invariants
//! - Matchers are pure: same prefix, same answer, no I/O.
//! - A matcher never sees more than its declared window; a prefix shorter
//!   than the signature it checks yields `false`, never a guess.
//!
//! # Design Notes
//! - Tar has no reliable magic in old (v7) archives, so besides the ustar
//!   magic it carries a checksum-scanning [`TarHeuristic`]. Heuristics are
//!   only consulted after every magic signature declined.

use std::fmt;
use std::sync::Arc;

pub(crate) const TAR_BLOCK_LEN: usize = 512;

/// How much a positive match can be trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStrength {
    /// A fixed byte pattern.
    Magic,
    /// A plausibility check; consulted after all magic signatures.
    Heuristic,
}

type MatchFn = dyn Fn(&[u8]) -> bool + Send + Sync;

/// One way of recognising a format from its leading bytes.
#[derive(Clone)]
pub struct Signature {
    window: usize,
    strength: MatchStrength,
    matcher: Arc<MatchFn>,
}

impl Signature {
    pub fn magic(window: usize, matcher: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self::new(window, MatchStrength::Magic, matcher)
    }

    pub fn heuristic(
        window: usize,
        matcher: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(window, MatchStrength::Heuristic, matcher)
    }

    fn new(
        window: usize,
        strength: MatchStrength,
        matcher: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            window,
            strength,
            matcher: Arc::new(matcher),
        }
    }

    /// Number of leading bytes the matcher may inspect.
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn strength(&self) -> MatchStrength {
        self.strength
    }

    pub fn matches(&self, prefix: &[u8]) -> bool {
        let end = prefix.len().min(self.window);
        (self.matcher)(&prefix[..end])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("window", &self.window)
            .field("strength", &self.strength)
            .finish_non_exhaustive()
    }
}

fn starts_with(data: &[u8], magic: &[u8]) -> bool {
    data.len() >= magic.len() && &data[..magic.len()] == magic
}

fn le32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn is_bzip2(data: &[u8]) -> bool {
    starts_with(data, b"BZh")
}

pub(crate) fn is_gzip(data: &[u8]) -> bool {
    starts_with(data, &[0x1F, 0x8B])
}

pub(crate) fn is_pack200(data: &[u8]) -> bool {
    starts_with(data, &[0xCA, 0xFE, 0xD0, 0x0D])
}

pub(crate) fn is_snappy_framed(data: &[u8]) -> bool {
    starts_with(data, &[0xFF, 0x06, 0x00, 0x00, b's', b'N', b'a', b'P', b'p', b'Y'])
}

/// Unix `compress`. Needs four bytes even though only two are compared.
pub(crate) fn is_z(data: &[u8]) -> bool {
    data.len() > 3 && data[0] == 0x1F && data[1] == 0x9D
}

/// zlib header with a deflate method byte and one of the standard levels.
pub(crate) fn is_deflate(data: &[u8]) -> bool {
    data.len() > 3 && data[0] == 0x78 && matches!(data[1], 0x01 | 0x5E | 0x9C | 0xDA)
}

pub(crate) fn is_xz(data: &[u8]) -> bool {
    starts_with(data, &[0xFD, b'7', b'z', b'X', b'Z', 0x00])
}

pub(crate) fn is_lzma(data: &[u8]) -> bool {
    starts_with(data, &[0x5D, 0x00, 0x00])
}

pub(crate) fn is_lz4_framed(data: &[u8]) -> bool {
    starts_with(data, &[0x04, 0x22, 0x4D, 0x18])
}

/// Zstandard frame, or a skippable frame (`0x184D2A5?`).
pub(crate) fn is_zstd(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    starts_with(data, &[0x28, 0xB5, 0x2F, 0xFD])
        || (data[0] & 0xF0 == 0x50 && data[1..4] == [0x2A, 0x4D, 0x18])
}

/// Local file header, empty archive, spanned and single-segment markers.
pub(crate) fn is_zip(data: &[u8]) -> bool {
    if data.len() < 4 || data[0] != b'P' || data[1] != b'K' {
        return false;
    }
    matches!((data[2], data[3]), (3, 4) | (5, 6) | (7, 8) | (0x30, 0x30))
}

pub(crate) fn is_ar(data: &[u8]) -> bool {
    starts_with(data, b"!<arch>\n")
}

pub(crate) fn is_arj(data: &[u8]) -> bool {
    starts_with(data, &[0x60, 0xEA])
}

/// Old binary cpio (either byte order) or one of the ASCII variants.
pub(crate) fn is_cpio(data: &[u8]) -> bool {
    if data.len() < 6 {
        return false;
    }
    if matches!((data[0], data[1]), (0x71, 0xC7) | (0xC7, 0x71)) {
        return true;
    }
    matches!(&data[..6], b"070701" | b"070702" | b"070707")
}

pub(crate) fn is_seven_z(data: &[u8]) -> bool {
    starts_with(data, &[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C])
}

pub(crate) const DUMP_WINDOW: usize = 1024;
const DUMP_MAGIC_OFFSET: usize = 24;
const DUMP_CHECKSUM_OFFSET: usize = 28;
const DUMP_NFS_MAGIC: i32 = 60012;
const DUMP_CHECKSUM: i32 = 84446;

/// BSD dump tape header. With a full record the checksum is verified too.
pub(crate) fn is_dump(data: &[u8]) -> bool {
    if data.len() < 32 {
        return false;
    }
    if le32(data, DUMP_MAGIC_OFFSET) != DUMP_NFS_MAGIC {
        return false;
    }
    if data.len() < DUMP_WINDOW {
        return true;
    }
    let sum = (0..DUMP_WINDOW / 4).fold(0i32, |acc, i| acc.wrapping_add(le32(data, 4 * i)));
    let stored = le32(data, DUMP_CHECKSUM_OFFSET);
    stored == DUMP_CHECKSUM.wrapping_sub(sum.wrapping_sub(stored))
}

const USTAR_MAGIC_OFFSET: usize = 257;
const USTAR_VERSION_OFFSET: usize = 263;
pub(crate) const USTAR_WINDOW: usize = USTAR_VERSION_OFFSET + 2;

/// POSIX, GNU and ant flavours of the ustar magic.
pub(crate) fn is_ustar(data: &[u8]) -> bool {
    if data.len() < USTAR_WINDOW {
        return false;
    }
    let magic = &data[USTAR_MAGIC_OFFSET..USTAR_VERSION_OFFSET];
    let version = &data[USTAR_VERSION_OFFSET..USTAR_WINDOW];
    matches!(
        (magic, version),
        (b"ustar\0", b"00") | (b"ustar ", b" \0") | (b"ustar ", b"0\0") | (b"ustar\0", b"\0\0")
    )
}

/// Checksum scan over the first few tar records.
///
/// Accepts when a regular entry with content has a valid header checksum.
/// Archives that start with directories are walked past them; with
/// `accept_directory_only` a run of valid directory headers is enough.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TarHeuristic {
    pub max_records: usize,
    pub accept_directory_only: bool,
}

impl Default for TarHeuristic {
    fn default() -> Self {
        Self {
            max_records: 10,
            accept_directory_only: true,
        }
    }
}

impl TarHeuristic {
    pub fn max_records(mut self, n: usize) -> Self {
        self.max_records = n;
        self
    }

    pub fn accept_directory_only(mut self, accept: bool) -> Self {
        self.accept_directory_only = accept;
        self
    }

    pub fn window(&self) -> usize {
        self.max_records.max(1) * TAR_BLOCK_LEN
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        let mut directories = 0usize;
        for block in data.chunks_exact(TAR_BLOCK_LEN).take(self.max_records) {
            let Some(header) = TarHeader::parse(block) else {
                break;
            };
            if header.is_directory {
                directories += 1;
                continue;
            }
            if header.size > 0 {
                return true;
            }
            // empty regular file; its successor header follows immediately
        }
        self.accept_directory_only && directories > 0
    }

    pub fn into_signature(self) -> Signature {
        Signature::heuristic(self.window(), move |data| self.matches(data))
    }
}

struct TarHeader {
    is_directory: bool,
    size: u64,
}

impl TarHeader {
    const NAME_LEN: usize = 100;
    const SIZE_OFFSET: usize = 124;
    const CHECKSUM_OFFSET: usize = 148;
    const CHECKSUM_LEN: usize = 8;
    const TYPEFLAG_OFFSET: usize = 156;

    /// `None` when the block is not a header with a valid checksum.
    fn parse(block: &[u8]) -> Option<Self> {
        if block.iter().all(|&b| b == 0) {
            return None;
        }
        let stored = parse_octal(&block[Self::CHECKSUM_OFFSET..][..Self::CHECKSUM_LEN])?;
        let (unsigned, signed) = header_checksums(block);
        if stored != unsigned && stored as i64 != signed {
            return None;
        }
        let name = &block[..Self::NAME_LEN];
        let name_len = name.iter().position(|&b| b == 0).unwrap_or(Self::NAME_LEN);
        let is_directory = block[Self::TYPEFLAG_OFFSET] == b'5'
            || (name_len > 0 && name[name_len - 1] == b'/');
        let size = parse_size(&block[Self::SIZE_OFFSET..][..12]).unwrap_or(0);
        Some(Self { is_directory, size })
    }
}

/// Unsigned and signed byte sums with the checksum field read as spaces.
fn header_checksums(block: &[u8]) -> (u64, i64) {
    let mut unsigned = 0u64;
    let mut signed = 0i64;
    let checksum_field =
        TarHeader::CHECKSUM_OFFSET..TarHeader::CHECKSUM_OFFSET + TarHeader::CHECKSUM_LEN;
    for (i, &b) in block.iter().enumerate() {
        let b = if checksum_field.contains(&i) { b' ' } else { b };
        unsigned += u64::from(b);
        signed += i64::from(b as i8);
    }
    (unsigned, signed)
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits = field
        .iter()
        .skip_while(|&&b| b == b' ' || b == 0)
        .take_while(|&&b| b != b' ' && b != 0);
    let mut value = 0u64;
    let mut seen = false;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        value = value.checked_mul(8)?.checked_add(u64::from(b - b'0'))?;
        seen = true;
    }
    seen.then_some(value)
}

/// Octal, or GNU base-256 when the high bit of the first byte is set.
fn parse_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 != 0 {
        let mut value = u64::from(field[0] & 0x7F);
        for &b in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(b))?;
        }
        return Some(value);
    }
    parse_octal(field)
}
