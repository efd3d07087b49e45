//! File classification.
//!
//! Every regular file is classified exactly once, at creation time, as either
//! pass-through (written bytes are retained) or blackhole (written bytes are
//! discarded while size and timestamps advance as if the write succeeded).
//! The decision is a pure function of the file name and the two patterns in
//! force at that instant; it is stored on the inode and never recomputed, so
//! later pattern changes or renames cannot reclassify an existing file.

/// How a regular file handles its data, bound once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBehavior {
    /// Written bytes are retained and returned verbatim on read.
    PassThrough,
    /// Written bytes are discarded; only size and timestamps are updated.
    Blackhole,
}

/// Classify a file name against the mount's write-allow pattern and the live
/// exclude pattern.
///
/// A name is pass-through if it contains `write_pattern` (when the mount set
/// one) or contains the non-empty `exclude` pattern. The two rules combine
/// with OR; matching is case-sensitive substring containment against the
/// final path component. With no write-allow pattern and an empty exclude
/// pattern every file is a blackhole.
///
/// # Arguments
/// * `name` - Final path component of the file being created
/// * `write_pattern` - Mount-scoped write-allow pattern, if configured
/// * `exclude` - Live exclude pattern (empty means no rule)
pub fn classify(name: &str, write_pattern: Option<&str>, exclude: &str) -> FileBehavior {
    if let Some(pattern) = write_pattern {
        if name.contains(pattern) {
            return FileBehavior::PassThrough;
        }
    }
    if !exclude.is_empty() && name.contains(exclude) {
        return FileBehavior::PassThrough;
    }
    FileBehavior::Blackhole
}
