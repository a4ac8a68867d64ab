use std::path::{Component, Path, PathBuf};

use arcodec::{DecodeOptions, EncodeOptions, Error, MAX_LEVEL, resolve_entry_path};
use proptest::prelude::*;

fn root() -> PathBuf {
    std::env::temp_dir().join("arcodec-prop-root")
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-zA-Z0-9_.-]{1,8}",
        2 => Just("..".to_owned()),
        1 => Just(".".to_owned()),
    ]
}

fn entry_name() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        prop::collection::vec(segment(), 1..6),
        prop_oneof![Just("/"), Just("\\")],
    )
        .prop_map(|(absolute, parts, sep)| {
            let joined = parts.join(sep);
            if absolute { format!("/{joined}") } else { joined }
        })
}

/// Depth after walking the segments, or `None` once it goes above the start.
fn lexical_depth(name: &str) -> Option<usize> {
    let mut depth = 0usize;
    for part in name.split(['/', '\\']).filter(|p| !p.is_empty()) {
        match part {
            "." => {}
            ".." => depth = depth.checked_sub(1)?,
            _ => depth += 1,
        }
    }
    Some(depth)
}

proptest! {
    #[test]
    fn resolved_paths_never_leave_root(name in entry_name()) {
        let root = root();
        match resolve_entry_path(&root, &name) {
            Ok(resolved) => {
                prop_assert!(resolved.resolved.starts_with(&root));
                prop_assert!(!resolved
                    .relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::RootDir)));
                prop_assert_eq!(resolved.resolved, root.join(&resolved.relative));
            }
            Err(Error::PathEscape { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn escapes_match_lexical_walk(name in entry_name()) {
        let escapes = name.starts_with('/') || lexical_depth(&name).is_none();
        let result = resolve_entry_path(root(), &name);
        prop_assert_eq!(result.is_err(), escapes, "{}", name);
    }

    #[test]
    fn plain_segments_resolve_verbatim(parts in prop::collection::vec("[a-z0-9]{1,6}", 1..5)) {
        let name = parts.join("/");
        let resolved = resolve_entry_path(root(), &name).unwrap();
        prop_assert_eq!(resolved.relative, Path::new(&name).to_path_buf());
        prop_assert!(resolved.resolved != root());
    }

    #[test]
    fn memory_limit_is_kept_or_rejected(kb in any::<i64>()) {
        let built = DecodeOptions::builder().with_max_memory_limit_in_kb(kb).build();
        if kb >= 0 {
            prop_assert_eq!(built.unwrap().max_memory_limit_kb(), Some(kb as u64));
        } else {
            let is_configuration_error = matches!(built, Err(Error::Configuration { .. }));
            prop_assert!(is_configuration_error);
        }
    }

    #[test]
    fn level_range(level in -50i64..50) {
        let built = EncodeOptions::builder().with_level(level).build();
        prop_assert_eq!(built.is_ok(), (0..=i64::from(MAX_LEVEL)).contains(&level));
    }
}
