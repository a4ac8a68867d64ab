use tracing::warn;

use crate::error::{Error, Result};

/// Decode-time tunables. Built only through [`DecodeOptionsBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecodeOptions {
    max_memory_limit_kb: Option<u64>,
    use_default_name_for_unnamed_entries: bool,
    try_to_recover_broken_archives: bool,
    decompress_concatenated: bool,
}

impl DecodeOptions {
    /// No memory limit, no renaming, no recovery, first stream member only.
    pub const DEFAULT: Self = Self {
        max_memory_limit_kb: None,
        use_default_name_for_unnamed_entries: false,
        try_to_recover_broken_archives: false,
        decompress_concatenated: false,
    };

    pub fn builder() -> DecodeOptionsBuilder {
        DecodeOptionsBuilder::default()
    }

    /// Builder pre-loaded with this snapshot's values.
    pub fn to_builder(&self) -> DecodeOptionsBuilder {
        DecodeOptionsBuilder {
            max_memory_limit_kb: self.max_memory_limit_kb.map(|kb| kb.min(i64::MAX as u64) as i64),
            use_default_name_for_unnamed_entries: self.use_default_name_for_unnamed_entries,
            try_to_recover_broken_archives: self.try_to_recover_broken_archives,
            decompress_concatenated: self.decompress_concatenated,
        }
    }

    /// Ceiling on decoder working memory; `None` means unlimited.
    pub fn max_memory_limit_kb(&self) -> Option<u64> {
        self.max_memory_limit_kb
    }

    pub(crate) fn max_memory_limit_bytes(&self) -> Option<u64> {
        self.max_memory_limit_kb.map(|kb| kb.saturating_mul(1024))
    }

    /// Unnamed archive entries receive `unnamed-<index>` instead of failing.
    pub fn use_default_name_for_unnamed_entries(&self) -> bool {
        self.use_default_name_for_unnamed_entries
    }

    /// Readers keep going past damaged metadata where the format allows it.
    ///
    /// Recovery trusts heuristically located metadata and may allocate in
    /// proportion to size fields taken from the damaged stream. Pair it with
    /// a memory ceiling.
    pub fn try_to_recover_broken_archives(&self) -> bool {
        self.try_to_recover_broken_archives
    }

    /// Keep decoding after the first member of a concatenated stream.
    pub fn decompress_concatenated(&self) -> bool {
        self.decompress_concatenated
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Accumulates overrides; [`build`](Self::build) snapshots them.
///
/// Building does not consume the builder, so one builder can produce
/// several variants.
#[derive(Clone, Debug, Default)]
pub struct DecodeOptionsBuilder {
    max_memory_limit_kb: Option<i64>,
    use_default_name_for_unnamed_entries: bool,
    try_to_recover_broken_archives: bool,
    decompress_concatenated: bool,
}

impl DecodeOptionsBuilder {
    /// Negative values are rejected by `build`.
    pub fn with_max_memory_limit_in_kb(mut self, kb: i64) -> Self {
        self.max_memory_limit_kb = Some(kb);
        self
    }

    pub fn without_memory_limit(mut self) -> Self {
        self.max_memory_limit_kb = None;
        self
    }

    pub fn with_use_default_name_for_unnamed_entries(mut self, enabled: bool) -> Self {
        self.use_default_name_for_unnamed_entries = enabled;
        self
    }

    pub fn with_try_to_recover_broken_archives(mut self, enabled: bool) -> Self {
        self.try_to_recover_broken_archives = enabled;
        self
    }

    pub fn with_decompress_concatenated(mut self, enabled: bool) -> Self {
        self.decompress_concatenated = enabled;
        self
    }

    pub fn build(&self) -> Result<DecodeOptions> {
        let max_memory_limit_kb = match self.max_memory_limit_kb {
            Some(kb) if kb < 0 => {
                return Err(Error::config(
                    "max_memory_limit_kb",
                    format!("must be non-negative, got {kb}"),
                ));
            }
            Some(kb) => Some(kb as u64),
            None => None,
        };

        if self.try_to_recover_broken_archives && max_memory_limit_kb.is_none() {
            warn!("archive recovery enabled without a memory limit");
        }

        Ok(DecodeOptions {
            max_memory_limit_kb,
            use_default_name_for_unnamed_entries: self.use_default_name_for_unnamed_entries,
            try_to_recover_broken_archives: self.try_to_recover_broken_archives,
            decompress_concatenated: self.decompress_concatenated,
        })
    }
}

pub const MAX_LEVEL: u32 = 22;

/// Encode-time tunables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EncodeOptions {
    level: Option<u32>,
}

impl EncodeOptions {
    pub const DEFAULT: Self = Self { level: None };

    pub fn builder() -> EncodeOptionsBuilder {
        EncodeOptionsBuilder::default()
    }

    /// Requested level; `None` uses each codec's own default.
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    /// Requested level clamped to a codec's range, or its default.
    pub(crate) fn level_in(&self, min: u32, max: u32, default: u32) -> u32 {
        self.level.map_or(default, |level| level.clamp(min, max))
    }
}

#[derive(Clone, Debug, Default)]
pub struct EncodeOptionsBuilder {
    level: Option<i64>,
}

impl EncodeOptionsBuilder {
    /// Accepted range is `0..=22`; codecs with a narrower scale clamp.
    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    pub fn build(&self) -> Result<EncodeOptions> {
        let level = match self.level {
            Some(level) if !(0..=i64::from(MAX_LEVEL)).contains(&level) => {
                return Err(Error::config(
                    "level",
                    format!("must be within 0..={MAX_LEVEL}, got {level}"),
                ));
            }
            level => level.map(|l| l as u32),
        };
        Ok(EncodeOptions { level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_snapshot() {
        let options = DecodeOptions::builder().build().unwrap();
        assert_eq!(options, DecodeOptions::DEFAULT);
        assert_eq!(options.max_memory_limit_kb(), None);
        assert!(!options.use_default_name_for_unnamed_entries());
        assert!(!options.try_to_recover_broken_archives());
        assert!(!options.decompress_concatenated());
    }

    #[test]
    fn builder_pattern() {
        let options = DecodeOptions::builder()
            .with_max_memory_limit_in_kb(4096)
            .with_use_default_name_for_unnamed_entries(true)
            .with_try_to_recover_broken_archives(true)
            .build()
            .unwrap();
        assert_eq!(options.max_memory_limit_kb(), Some(4096));
        assert_eq!(options.max_memory_limit_bytes(), Some(4096 * 1024));
        assert!(options.use_default_name_for_unnamed_entries());
        assert!(options.try_to_recover_broken_archives());
    }

    #[test]
    fn negative_memory_limit_fails_at_build() {
        let builder = DecodeOptions::builder().with_max_memory_limit_in_kb(-1);
        let err = builder.build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn builder_is_reusable() {
        let builder = DecodeOptions::builder().with_max_memory_limit_in_kb(64);
        let first = builder.build().unwrap();
        let second = builder.clone().with_decompress_concatenated(true).build().unwrap();
        let third = builder.build().unwrap();
        assert_eq!(first, third);
        assert_ne!(first, second);
        assert_eq!(second.max_memory_limit_kb(), Some(64));
    }

    #[test]
    fn to_builder_round_trips() {
        let options = DecodeOptions::builder()
            .with_max_memory_limit_in_kb(10)
            .with_decompress_concatenated(true)
            .build()
            .unwrap();
        assert_eq!(options.to_builder().build().unwrap(), options);
    }

    #[test]
    fn encode_level_validation() {
        assert_eq!(EncodeOptions::builder().build().unwrap().level(), None);
        assert_eq!(
            EncodeOptions::builder().with_level(9).build().unwrap().level(),
            Some(9)
        );
        assert!(EncodeOptions::builder().with_level(23).build().is_err());
        assert!(EncodeOptions::builder().with_level(-3).build().is_err());
    }

    #[test]
    fn encode_level_clamps_per_codec() {
        let options = EncodeOptions::builder().with_level(22).build().unwrap();
        assert_eq!(options.level_in(0, 9, 6), 9);
        assert_eq!(EncodeOptions::DEFAULT.level_in(0, 9, 6), 6);
    }
}
