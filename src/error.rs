//! Error types for the nullfs crate.

use thiserror::Error;

/// Errors surfaced by namespace and mount operations.
///
/// Read and write calls on regular files never fail in this filesystem;
/// the only modeled failure modes are inode allocation (`NoSpace`),
/// malformed mount options (`InvalidOption`), and the usual tree-shape
/// errors a VFS caller can trigger.
#[derive(Debug, Error)]
pub enum NullfsError {
    /// The allocator cannot produce a new inode.
    #[error("no space for a new inode")]
    NoSpace,

    /// A mount option failed to parse. The mount fails entirely.
    #[error("invalid mount option {option}={value}")]
    InvalidOption {
        /// The option key.
        option: String,
        /// The rejected value.
        value: String,
    },

    /// Inode not found.
    #[error("inode not found: {0}")]
    InodeNotFound(u64),

    /// Operation requires a directory.
    #[error("not a directory: {0}")]
    NotADirectory(u64),

    /// Operation is invalid on a directory.
    #[error("is a directory: {0}")]
    IsADirectory(u64),

    /// A directory entry with this name already exists.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// No directory entry with this name.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Directory still has children.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The operation does not apply to this inode kind.
    #[error("invalid operation on inode {0}")]
    InvalidOperation(u64),

    /// Mount operation failed.
    #[error("mount failed: {0}")]
    MountFailed(String),
}
