//! Format detection.
//!
//! # Algorithm
//! - Every magic signature is tried in registry order; the first match wins.
//! - Only when no magic matched are heuristic signatures tried, again in
//!   registry order.
//!
//! # Design Notes
//! - First match rather than longest match: weak heuristics (tar without
//!   ustar magic) would otherwise shadow concrete magic bytes.
//! - Specialisations that share a container's signature (jar inside zip)
//!   register no signature and are reachable only by name.

use std::io::{self, Read, Seek};
use std::sync::Arc;

use crate::format::FormatKind;
use crate::handler::CodecHandler;
use crate::signature::MatchStrength;

const PASSES: [MatchStrength; 2] = [MatchStrength::Magic, MatchStrength::Heuristic];

pub(crate) fn detect_in<'a>(
    handlers: &'a [Arc<CodecHandler>],
    prefix: &[u8],
    kind: Option<FormatKind>,
) -> Option<&'a Arc<CodecHandler>> {
    PASSES.into_iter().find_map(|strength| {
        handlers
            .iter()
            .filter(|handler| kind.is_none_or(|kind| handler.kind() == kind))
            .find(|handler| handler.matches_with(prefix, strength))
    })
}

/// Read up to `window` bytes, stopping early only at end of stream.
pub fn read_prefix<R: Read + ?Sized>(reader: &mut R, window: usize) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(window);
    Read::take(&mut *reader, window as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Read the signature window from a seekable stream and rewind it.
pub fn read_prefix_and_rewind<R: Read + Seek + ?Sized>(
    reader: &mut R,
    window: usize,
) -> io::Result<Vec<u8>> {
    let start = reader.stream_position()?;
    let prefix = read_prefix(reader, window)?;
    reader.seek(io::SeekFrom::Start(start))?;
    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatName;
    use crate::signature::Signature;
    use std::io::Cursor;

    fn handler(name: &str, kind: FormatKind, signature: Signature) -> Arc<CodecHandler> {
        Arc::new(
            CodecHandler::builder(FormatName::new(name), kind)
                .signature(signature)
                .build(),
        )
    }

    #[test]
    fn magic_beats_earlier_heuristic() {
        let handlers = [
            handler("loose", FormatKind::Archive, Signature::heuristic(4, |_| true)),
            handler("exact", FormatKind::Archive, Signature::magic(2, |d| d.starts_with(b"EX"))),
        ];
        let found = detect_in(&handlers, b"EXAMPLE", None).unwrap();
        assert_eq!(found.name(), "exact");
        let fallback = detect_in(&handlers, b"other", None).unwrap();
        assert_eq!(fallback.name(), "loose");
    }

    #[test]
    fn first_registered_magic_wins() {
        let seven = || Signature::magic(1, |d| d.first() == Some(&7));
        let handlers = [
            handler("first", FormatKind::Compressor, seven()),
            handler("second", FormatKind::Compressor, seven()),
        ];
        assert_eq!(detect_in(&handlers, &[7], None).unwrap().name(), "first");
    }

    #[test]
    fn kind_filter() {
        let handlers = [
            handler("c", FormatKind::Compressor, Signature::magic(1, |d| !d.is_empty())),
            handler("a", FormatKind::Archive, Signature::magic(1, |d| !d.is_empty())),
        ];
        let found = detect_in(&handlers, &[1], Some(FormatKind::Archive)).unwrap();
        assert_eq!(found.name(), "a");
        assert!(detect_in(&handlers, &[], None).is_none());
    }

    #[test]
    fn short_stream_prefix() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let prefix = read_prefix_and_rewind(&mut cursor, 32).unwrap();
        assert_eq!(prefix, [1, 2, 3]);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn prefix_is_bounded() {
        let mut cursor = Cursor::new(vec![0u8; 4096]);
        let prefix = read_prefix(&mut cursor, 600).unwrap();
        assert_eq!(prefix.len(), 600);
        assert_eq!(cursor.position(), 600);
    }
}
