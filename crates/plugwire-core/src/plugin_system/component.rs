//! Hierarchical component names.
//!
//! Component names are dot-separated paths (`"storage.sqlite"`). A name `A` is
//! a subtype of `B` when `B`'s segments are a prefix of `A`'s segments, so
//! `"storage.sqlite"` is a subtype of `"storage"` but `"storages"` is not.

/// Dot-separated segments of a component name.
pub fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split('.')
}

/// Whether `candidate` is `ancestor` or one of its subtypes.
pub fn is_subtype(candidate: &str, ancestor: &str) -> bool {
    let mut candidate_segments = segments(candidate);
    segments(ancestor).all(|segment| candidate_segments.next() == Some(segment))
}

/// Whether `candidate` is a subtype of `ancestor` other than `ancestor` itself.
pub fn is_strict_subtype(candidate: &str, ancestor: &str) -> bool {
    candidate != ancestor && is_subtype(candidate, ancestor)
}
