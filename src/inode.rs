//! Inode records and the per-behavior read/write state machine.
//!
//! Every namespace entry is an [`Inode`] carrying the usual metadata (size,
//! block count, timestamps, mode, owner, link count) plus a kind-specific
//! payload. Regular files carry the [`FileBehavior`] chosen at creation; the
//! tag has no setter, so a file can never be reclassified after the fact.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::classify::FileBehavior;
use crate::error::NullfsError;

/// Inode identifier.
pub type InodeId = u64;

/// Inode number of the namespace root directory.
pub const ROOT_INO: InodeId = 1;

/// Page-equivalent unit used to pre-size directories.
pub const PAGE_SIZE: u64 = 4096;

/// Block unit for derived block counts.
pub const BLOCK_SIZE: u64 = 512;

/// Flavor of a special inode created with mknod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix socket.
    Socket,
}

/// Kind-specific payload of an inode.
#[derive(Debug)]
pub enum InodeKind {
    /// Directory with uniquely named children.
    Directory {
        /// Name to child inode mapping.
        children: BTreeMap<String, InodeId>,
    },
    /// Regular file with its behavior bound at creation.
    ///
    /// `data` holds real bytes for pass-through files and stays empty for
    /// blackhole files, whose size is tracked on the inode alone.
    File {
        /// Pass-through or blackhole, immutable for the life of the inode.
        behavior: FileBehavior,
        /// Backing bytes (pass-through only).
        data: Vec<u8>,
    },
    /// Symbolic link with its target stored inline. Never classified.
    Symlink {
        /// Link target.
        target: String,
    },
    /// Device node, fifo, or socket. Never classified.
    Special {
        /// Which flavor of special inode.
        kind: SpecialKind,
        /// Device number.
        rdev: u32,
    },
}

/// In-memory metadata for one namespace entry.
#[derive(Debug)]
pub struct Inode {
    /// Unique inode number.
    pub ino: InodeId,
    /// Containing directory (self for the root).
    pub parent: InodeId,
    /// Kind-specific payload.
    pub kind: InodeKind,
    /// Byte size. Authoritative: for blackhole files it is not derived from
    /// stored bytes, and only ever grows.
    pub size: u64,
    /// Block count. Derived for pass-through files; for blackhole files it
    /// counts write calls observed, one unit per call regardless of length.
    pub blocks: u64,
    /// Access time.
    pub atime: SystemTime,
    /// Modification time.
    pub mtime: SystemTime,
    /// Change time.
    pub ctime: SystemTime,
    /// Permission bits.
    pub mode: u16,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Link count: 1 for files, 2 for directories (self + parent reference).
    pub nlink: u32,
}

impl Inode {
    /// Build a fresh inode with all timestamps at the current instant.
    ///
    /// Directories are pre-sized to one page, symlinks to their target
    /// length; link counts start at 2 for directories and 1 otherwise.
    pub(crate) fn new(
        ino: InodeId,
        parent: InodeId,
        kind: InodeKind,
        mode: u16,
        uid: u32,
        gid: u32,
    ) -> Self {
        let now: SystemTime = SystemTime::now();
        let (size, nlink) = match &kind {
            InodeKind::Directory { .. } => (PAGE_SIZE, 2),
            InodeKind::Symlink { target } => (target.len() as u64, 1),
            _ => (0, 1),
        };
        Self {
            ino,
            parent,
            kind,
            size,
            blocks: size.div_ceil(BLOCK_SIZE),
            atime: now,
            mtime: now,
            ctime: now,
            mode,
            uid,
            gid,
            nlink,
        }
    }

    /// Whether this inode is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Directory { .. })
    }

    /// Behavior tag for regular files, `None` for other kinds.
    pub fn behavior(&self) -> Option<FileBehavior> {
        match &self.kind {
            InodeKind::File { behavior, .. } => Some(*behavior),
            _ => None,
        }
    }

    /// Write `buf` at `offset`.
    ///
    /// Pass-through files retain the bytes, zero-filling any gap before
    /// `offset`, and report their actual stored extent. Blackhole files
    /// discard the bytes, grow their size by the full request regardless of
    /// offset, and bump the block count by one per call. Both variants
    /// always accept the full request.
    ///
    /// # Arguments
    /// * `offset` - Write position (ignored by blackhole files)
    /// * `buf` - Bytes to write
    ///
    /// # Returns
    /// Number of bytes accepted, always `buf.len()`.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<usize, NullfsError> {
        let Inode {
            ino,
            kind,
            size,
            blocks,
            mtime,
            ctime,
            ..
        } = self;
        match kind {
            InodeKind::File {
                behavior: FileBehavior::PassThrough,
                data,
            } => {
                let start: usize = offset as usize;
                let end: usize = start + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(buf);
                *size = data.len() as u64;
                *blocks = size.div_ceil(BLOCK_SIZE);
            }
            InodeKind::File {
                behavior: FileBehavior::Blackhole,
                ..
            } => {
                *size += buf.len() as u64;
                *blocks += 1;
            }
            InodeKind::Directory { .. } => return Err(NullfsError::IsADirectory(*ino)),
            _ => return Err(NullfsError::InvalidOperation(*ino)),
        }
        let now: SystemTime = SystemTime::now();
        *mtime = now;
        *ctime = now;
        Ok(buf.len())
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Pass-through files return the stored bytes clipped to the file size.
    /// Blackhole files return nothing at or past end of file and otherwise
    /// `min(size - offset, len)` bytes of unspecified content (zeroes here;
    /// callers must not depend on it).
    ///
    /// # Arguments
    /// * `offset` - Read position
    /// * `len` - Requested byte count
    pub fn read_at(&self, offset: u64, len: u32) -> Result<Vec<u8>, NullfsError> {
        match &self.kind {
            InodeKind::File {
                behavior: FileBehavior::PassThrough,
                data,
            } => {
                let start: usize = (offset as usize).min(data.len());
                let end: usize = (start + len as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            InodeKind::File {
                behavior: FileBehavior::Blackhole,
                ..
            } => {
                if offset >= self.size {
                    return Ok(Vec::new());
                }
                let n: u64 = (self.size - offset).min(len as u64);
                Ok(vec![0u8; n as usize])
            }
            InodeKind::Directory { .. } => Err(NullfsError::IsADirectory(self.ino)),
            _ => Err(NullfsError::InvalidOperation(self.ino)),
        }
    }

    /// Apply a size change from setattr.
    ///
    /// Pass-through files truncate or zero-extend their backing bytes.
    /// Blackhole sizes are append-only, so the request is accepted and
    /// ignored, matching the pretend-it-worked write contract.
    pub(crate) fn set_size(&mut self, new_size: u64) {
        if let InodeKind::File {
            behavior: FileBehavior::PassThrough,
            data,
        } = &mut self.kind
        {
            data.resize(new_size as usize, 0);
            self.size = new_size;
            self.blocks = new_size.div_ceil(BLOCK_SIZE);
        }
    }

    /// Refresh modify/change time, used when a child entry is added or
    /// removed under a directory.
    pub(crate) fn touch(&mut self) {
        let now: SystemTime = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }
}
