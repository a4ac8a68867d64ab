use std::borrow::{Borrow, Cow};
use std::fmt;

use encoding_rs::Encoding;

/// Text encoding used for archive entry names.
pub type Charset = &'static Encoding;

/// Resolve a WHATWG encoding label such as `"utf-8"` or `"shift_jis"`.
pub fn charset_for_label(label: &str) -> Option<Charset> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Decode raw entry-name bytes, falling back to lossy UTF-8 without a charset.
pub(crate) fn decode_name(raw: &[u8], charset: Option<Charset>) -> String {
    match charset {
        Some(encoding) => encoding.decode_without_bom_handling(raw).0.into_owned(),
        None => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Stable identifier of a compression or container format.
///
/// Names are lowercase; [`FormatName::new`] normalizes its input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatName(Cow<'static, str>);

impl FormatName {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Cow::Owned(name.as_ref().trim().to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FormatName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FormatName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for FormatName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for FormatName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// What a decoded stream of the format looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// A single byte stream in, a single byte stream out.
    Compressor,
    /// A container of named entries.
    Archive,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compressor => f.write_str("compressor"),
            Self::Archive => f.write_str("archive"),
        }
    }
}

/// Names of the built-in formats.
pub mod names {
    use super::FormatName;

    pub const BROTLI: FormatName = FormatName::from_static("br");
    pub const BZIP2: FormatName = FormatName::from_static("bzip2");
    pub const GZIP: FormatName = FormatName::from_static("gz");
    pub const PACK200: FormatName = FormatName::from_static("pack200");
    pub const SNAPPY_FRAMED: FormatName = FormatName::from_static("snappy-framed");
    pub const SNAPPY_RAW: FormatName = FormatName::from_static("snappy-raw");
    pub const Z: FormatName = FormatName::from_static("z");
    pub const DEFLATE: FormatName = FormatName::from_static("deflate");
    pub const DEFLATE64: FormatName = FormatName::from_static("deflate64");
    pub const XZ: FormatName = FormatName::from_static("xz");
    pub const LZMA: FormatName = FormatName::from_static("lzma");
    pub const LZ4_BLOCK: FormatName = FormatName::from_static("lz4-block");
    pub const LZ4_FRAMED: FormatName = FormatName::from_static("lz4-framed");
    pub const ZSTD: FormatName = FormatName::from_static("zstd");

    pub const ZIP: FormatName = FormatName::from_static("zip");
    pub const JAR: FormatName = FormatName::from_static("jar");
    pub const AR: FormatName = FormatName::from_static("ar");
    pub const ARJ: FormatName = FormatName::from_static("arj");
    pub const CPIO: FormatName = FormatName::from_static("cpio");
    pub const DUMP: FormatName = FormatName::from_static("dump");
    pub const SEVEN_Z: FormatName = FormatName::from_static("7z");
    pub const TAR: FormatName = FormatName::from_static("tar");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn names_are_normalized() {
        assert_eq!(FormatName::new(" GZ "), names::GZIP);
        assert_eq!(FormatName::new("7Z").as_str(), "7z");
    }

    #[test]
    fn lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(names::TAR, 1);
        map.insert(FormatName::new("custom"), 2);
        assert_eq!(map.get("tar"), Some(&1));
        assert_eq!(map.get("custom"), Some(&2));
        assert_eq!(map.get("zip"), None);
    }

    #[test]
    fn charset_labels() {
        assert_eq!(charset_for_label("utf-8"), Some(encoding_rs::UTF_8));
        assert_eq!(charset_for_label("Shift_JIS"), Some(encoding_rs::SHIFT_JIS));
        assert!(charset_for_label("no-such-charset").is_none());
    }

    #[test]
    fn decode_names_with_charset() {
        let raw = [0x83, 0x65, 0x83, 0x58, 0x83, 0x67]; // "テスト" in Shift_JIS
        assert_eq!(decode_name(&raw, Some(encoding_rs::SHIFT_JIS)), "テスト");
        assert_eq!(decode_name(b"plain.txt", None), "plain.txt");
    }
}
