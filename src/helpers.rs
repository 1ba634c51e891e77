// ABOUTME: The closed runtime-helper roster referenced by generated code

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One entry in the helper roster.
///
/// `source_name` is how the helper is spelled in Quill source and by the
/// lowerer; `emitted_name` is the identifier generated TypeScript imports
/// from the runtime module. The set is closed: adding an entry is a
/// breaking change to the host contract, and neither macros nor the
/// emitter may synthesize names outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Helper {
    pub source_name: &'static str,
    pub emitted_name: &'static str,
}

pub const ROSTER: &[Helper] = &[
    Helper { source_name: "dynamic-get", emitted_name: "dynamicGet" },
    Helper { source_name: "dynamic-call", emitted_name: "dynamicCall" },
    Helper { source_name: "call-fn", emitted_name: "callFn" },
    Helper { source_name: "range", emitted_name: "range" },
    Helper { source_name: "to-sequence", emitted_name: "toSequence" },
    Helper { source_name: "for-each", emitted_name: "forEach" },
    Helper { source_name: "hash-map", emitted_name: "hashMap" },
    Helper { source_name: "throw", emitted_name: "throwError" },
    Helper { source_name: "deep-freeze", emitted_name: "deepFreeze" },
    Helper { source_name: "get-op", emitted_name: "getOp" },
    Helper { source_name: "lazy-seq", emitted_name: "lazySeq" },
    Helper { source_name: "delay", emitted_name: "delay" },
    Helper { source_name: "gensym", emitted_name: "gensym" },
    Helper { source_name: "trampoline", emitted_name: "trampoline" },
];

static BY_SOURCE: Lazy<HashMap<&'static str, &'static Helper>> =
    Lazy::new(|| ROSTER.iter().map(|h| (h.source_name, h)).collect());

static BY_EMITTED: Lazy<HashMap<&'static str, &'static Helper>> =
    Lazy::new(|| ROSTER.iter().map(|h| (h.emitted_name, h)).collect());

/// Look up a helper by its Quill-source spelling
pub fn by_source_name(name: &str) -> Option<&'static Helper> {
    BY_SOURCE.get(name).copied()
}

/// Look up a helper by the identifier it emits as
pub fn by_emitted_name(name: &str) -> Option<&'static Helper> {
    BY_EMITTED.get(name).copied()
}

/// True when an emitted identifier belongs to the roster
pub fn is_helper_identifier(name: &str) -> bool {
    BY_EMITTED.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_is_closed_and_distinct() {
        assert_eq!(ROSTER.len(), 14);
        let mut emitted: Vec<_> = ROSTER.iter().map(|h| h.emitted_name).collect();
        emitted.sort_unstable();
        emitted.dedup();
        assert_eq!(emitted.len(), ROSTER.len());
    }

    #[test]
    fn test_lookup_both_directions() {
        let h = by_source_name("dynamic-get").unwrap();
        assert_eq!(h.emitted_name, "dynamicGet");
        assert_eq!(by_emitted_name("trampoline").unwrap().source_name, "trampoline");
        assert!(by_source_name("not-a-helper").is_none());
    }

    #[test]
    fn test_is_helper_identifier() {
        assert!(is_helper_identifier("getOp"));
        assert!(is_helper_identifier("throwError"));
        assert!(!is_helper_identifier("console"));
    }
}
