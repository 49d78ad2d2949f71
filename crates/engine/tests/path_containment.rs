//! Randomised containment checks for the path gate.
//!
//! Whatever the client supplies — `..` chains, absolute prefixes, dot
//! segments, repeated separators — a successful resolution must land under
//! the shared root, and anything else must be rejected.

use std::path::{Path, PathBuf};

use proptest::prelude::*;

use scpd_engine::path_gate::resolve;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-zA-Z0-9._-]{1,12}",
        2 => Just("..".to_string()),
        1 => Just(".".to_string()),
        1 => Just("".to_string()),
    ]
}

fn target() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        prop::collection::vec(segment(), 0..8),
    )
        .prop_map(|(absolute, segments)| {
            let joined = segments.join("/");
            if absolute {
                format!("/{joined}")
            } else {
                joined
            }
        })
}

proptest! {
    /// Resolution either stays inside the root or fails; it never yields a
    /// path outside it.
    #[test]
    fn resolution_never_escapes_the_root(target in target()) {
        let root = Path::new("/srv/share");
        if let Ok(resolved) = resolve(root, &target) {
            prop_assert!(resolved.starts_with(root), "{target:?} -> {resolved:?}");
            // Nothing the gate returns can re-introduce traversal.
            prop_assert!(resolved
                .components()
                .all(|component| !matches!(
                    component,
                    std::path::Component::ParentDir | std::path::Component::CurDir
                )));
        }
    }

    /// Any target made purely of `..` segments is rejected or resolves to
    /// the root itself.
    #[test]
    fn parent_chains_never_climb_out(depth in 1usize..6) {
        let root = PathBuf::from("/srv/share");
        let target = vec![".."; depth].join("/");
        prop_assert!(resolve(&root, &target).is_err());
    }
}
