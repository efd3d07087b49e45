//! In-memory blackhole filesystem.
//!
//! This crate implements a filesystem that stores its structure in memory
//! while written data is sent to a blackhole: writes report success and the
//! file's size, timestamps, and the mount's free-space statistics stay
//! plausible, but the bytes are never retained. It is used to benchmark or
//! stress software that is sensitive to I/O latency and throughput but not
//! to the persisted content.
//!
//! A per-file policy decides at creation time whether a file really stores
//! its data: names matching the mount's `write=` pattern, or the live
//! exclude pattern changeable at runtime through [`ExcludeRule`], are
//! pass-through; everything else is a blackhole. The decision is bound to
//! the inode forever, so renames never reclassify a file.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE interface (fuser::Filesystem impl, feature "fuse")
//! Layer 2: Namespace operations (create, lookup, rename, readdir, statfs)
//! Layer 1: Primitives (Inode + FileBehavior, Classifier, ExcludeRule)
//! ```

pub mod classify;
pub mod error;
pub mod exclude;
pub mod inode;
pub mod namespace;
pub mod options;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use classify::{classify, FileBehavior};
pub use error::NullfsError;
pub use exclude::{ExcludeRule, EXCLUDE_PATTERN_CAPACITY};
pub use inode::{Inode, InodeId, InodeKind, SpecialKind, ROOT_INO};
pub use namespace::{FsStatistics, Namespace};
pub use options::MountOptions;

#[cfg(feature = "fuse")]
pub use fuse::{mount, spawn_mount, Nullfs};
