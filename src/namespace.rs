//! The in-memory namespace tree.
//!
//! A [`Namespace`] owns every inode record and the mount-wide configuration.
//! Directories hold name-to-inode references; the namespace owns the records
//! themselves. Creation of a regular file is the only point where the
//! classifier runs; every other operation here is bookkeeping that must never
//! disturb a file's bound behavior.
//!
//! Locking is left to the dispatch layer driving this tree (the FUSE session
//! serializes mutations); the namespace itself adds none.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use crate::classify::{classify, FileBehavior};
use crate::error::NullfsError;
use crate::exclude::ExcludeRule;
use crate::inode::{Inode, InodeId, InodeKind, SpecialKind, PAGE_SIZE, ROOT_INO};
use crate::options::MountOptions;

/// Reported total block count. The statistics report is a fixed illusion for
/// callers that gate behavior on free-space thresholds.
pub const REPORTED_TOTAL_BLOCKS: u64 = 100_000_000;

/// Reported free and available block count.
pub const REPORTED_FREE_BLOCKS: u64 = 90_000_000;

/// Maximum file name length reported to callers.
pub const NAME_MAX: u32 = 255;

/// Fixed free-space report, not reflecting any real backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStatistics {
    /// Total data blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Blocks available to unprivileged callers.
    pub bavail: u64,
    /// Total file nodes.
    pub files: u64,
    /// Free file nodes.
    pub ffree: u64,
    /// Block size in bytes.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size in bytes.
    pub frsize: u32,
}

/// The tree of inode records plus the mount-wide configuration.
#[derive(Debug)]
pub struct Namespace {
    inodes: HashMap<InodeId, Inode>,
    next_ino: InodeId,
    opts: MountOptions,
    exclude: ExcludeRule,
}

impl Namespace {
    /// Build a namespace with a root directory from parsed mount options and
    /// an injected exclude rule.
    ///
    /// A `write=` pattern also seeds the exclude rule, so a freshly mounted
    /// instance keeps the legacy behavior of sharing its pattern with every
    /// other mount holding the same rule.
    ///
    /// # Arguments
    /// * `opts` - Parsed mount options
    /// * `exclude` - Live exclude rule, shared across mounts by cloning
    pub fn new(opts: MountOptions, exclude: ExcludeRule) -> Self {
        if let Some(pattern) = &opts.write {
            exclude.set(pattern);
        }

        let uid: u32 = opts.uid.unwrap_or_else(|| unsafe { libc::getuid() });
        let gid: u32 = opts.gid.unwrap_or_else(|| unsafe { libc::getgid() });
        let root: Inode = Inode::new(
            ROOT_INO,
            ROOT_INO,
            InodeKind::Directory {
                children: BTreeMap::new(),
            },
            opts.mode,
            uid,
            gid,
        );

        let mut inodes: HashMap<InodeId, Inode> = HashMap::new();
        inodes.insert(ROOT_INO, root);
        Self {
            inodes,
            next_ino: ROOT_INO + 1,
            opts,
            exclude,
        }
    }

    /// Active mount options.
    pub fn options(&self) -> &MountOptions {
        &self.opts
    }

    /// Render the effective mount options back into `key=value` syntax,
    /// omitting keys at their default value.
    pub fn show_options(&self) -> String {
        self.opts.to_string()
    }

    /// The exclude rule this namespace classifies against.
    pub fn exclude(&self) -> &ExcludeRule {
        &self.exclude
    }

    /// Fetch an inode by number.
    pub fn get(&self, ino: InodeId) -> Option<&Inode> {
        self.inodes.get(&ino)
    }

    /// Number of live inodes, root included.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Resolve a name within a directory.
    pub fn lookup(&self, parent: InodeId, name: &str) -> Result<&Inode, NullfsError> {
        let ino: InodeId = self.lookup_ino(parent, name)?;
        self.inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))
    }

    /// Child entries of a directory, sorted by name.
    pub fn children(&self, ino: InodeId) -> Result<&BTreeMap<String, InodeId>, NullfsError> {
        match &self
            .inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .kind
        {
            InodeKind::Directory { children } => Ok(children),
            _ => Err(NullfsError::NotADirectory(ino)),
        }
    }

    /// Create a regular file. This is the single point where the classifier
    /// runs: the resulting behavior is bound to the inode for its lifetime.
    ///
    /// # Arguments
    /// * `parent` - Directory to create in
    /// * `name` - File name (final path component, used for classification)
    /// * `mode` - Permission bits
    /// * `uid` - Creator uid, overridden by a `uid=` mount option
    /// * `gid` - Creator gid, overridden by a `gid=` mount option
    pub fn create_file(
        &mut self,
        parent: InodeId,
        name: &str,
        mode: u16,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId, NullfsError> {
        let behavior: FileBehavior =
            classify(name, self.opts.write.as_deref(), &self.exclude.get());
        self.insert_child(
            parent,
            name,
            InodeKind::File {
                behavior,
                data: Vec::new(),
            },
            mode,
            uid,
            gid,
        )
    }

    /// Create a directory. The new record is pre-sized to one page and the
    /// parent's link count grows by one.
    pub fn mkdir(
        &mut self,
        parent: InodeId,
        name: &str,
        mode: u16,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId, NullfsError> {
        self.insert_child(
            parent,
            name,
            InodeKind::Directory {
                children: BTreeMap::new(),
            },
            mode,
            uid,
            gid,
        )
    }

    /// Create a symlink with its target stored inline. Symlinks are never
    /// subject to classification.
    pub fn symlink(
        &mut self,
        parent: InodeId,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId, NullfsError> {
        self.insert_child(
            parent,
            name,
            InodeKind::Symlink {
                target: target.to_string(),
            },
            0o777,
            uid,
            gid,
        )
    }

    /// Create a special inode (device node, fifo, socket).
    pub fn mknod(
        &mut self,
        parent: InodeId,
        name: &str,
        kind: SpecialKind,
        mode: u16,
        rdev: u32,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId, NullfsError> {
        self.insert_child(parent, name, InodeKind::Special { kind, rdev }, mode, uid, gid)
    }

    /// Add a hard link to an existing non-directory inode.
    pub fn link(
        &mut self,
        ino: InodeId,
        new_parent: InodeId,
        name: &str,
    ) -> Result<(), NullfsError> {
        {
            let inode: &Inode = self
                .inodes
                .get(&ino)
                .ok_or(NullfsError::InodeNotFound(ino))?;
            if inode.is_dir() {
                return Err(NullfsError::IsADirectory(ino));
            }
        }
        if self.children(new_parent)?.contains_key(name) {
            return Err(NullfsError::AlreadyExists(name.to_string()));
        }

        self.with_dir(new_parent, |dir| {
            dir_children(dir).insert(name.to_string(), ino);
            dir.touch();
        })?;
        let inode: &mut Inode = self
            .inodes
            .get_mut(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?;
        inode.nlink += 1;
        inode.ctime = SystemTime::now();
        Ok(())
    }

    /// Remove a non-directory entry. The record is reclaimed once its link
    /// count drops to zero; reference counting for open handles belongs to
    /// the dispatch layer.
    pub fn unlink(&mut self, parent: InodeId, name: &str) -> Result<(), NullfsError> {
        let ino: InodeId = self.lookup_ino(parent, name)?;
        if self
            .inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .is_dir()
        {
            return Err(NullfsError::IsADirectory(ino));
        }

        self.with_dir(parent, |dir| {
            dir_children(dir).remove(name);
            dir.touch();
        })?;
        let inode: &mut Inode = self
            .inodes
            .get_mut(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?;
        inode.nlink = inode.nlink.saturating_sub(1);
        inode.ctime = SystemTime::now();
        if inode.nlink == 0 {
            self.inodes.remove(&ino);
        }
        Ok(())
    }

    /// Remove an empty directory.
    pub fn rmdir(&mut self, parent: InodeId, name: &str) -> Result<(), NullfsError> {
        let ino: InodeId = self.lookup_ino(parent, name)?;
        match &self
            .inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .kind
        {
            InodeKind::Directory { children } if !children.is_empty() => {
                return Err(NullfsError::DirectoryNotEmpty(name.to_string()))
            }
            InodeKind::Directory { .. } => {}
            _ => return Err(NullfsError::NotADirectory(ino)),
        }

        self.with_dir(parent, |dir| {
            dir_children(dir).remove(name);
            dir.nlink = dir.nlink.saturating_sub(1);
            dir.touch();
        })?;
        self.inodes.remove(&ino);
        Ok(())
    }

    /// Move an entry, replacing a non-directory or empty-directory target.
    ///
    /// Renaming never re-runs the classifier: the moved inode keeps the
    /// behavior bound at creation even when the new name would classify
    /// differently under the patterns now in force.
    pub fn rename(
        &mut self,
        parent: InodeId,
        name: &str,
        new_parent: InodeId,
        new_name: &str,
    ) -> Result<(), NullfsError> {
        let src: InodeId = self.lookup_ino(parent, name)?;

        if let Ok(dst) = self.lookup_ino(new_parent, new_name) {
            if dst == src {
                return Ok(());
            }
            let dst_is_dir: bool = self
                .inodes
                .get(&dst)
                .ok_or(NullfsError::InodeNotFound(dst))?
                .is_dir();
            if dst_is_dir {
                self.rmdir(new_parent, new_name)?;
            } else {
                self.unlink(new_parent, new_name)?;
            }
        }

        let src_is_dir: bool = self
            .inodes
            .get(&src)
            .ok_or(NullfsError::InodeNotFound(src))?
            .is_dir();

        self.with_dir(parent, |dir| {
            dir_children(dir).remove(name);
            if src_is_dir {
                dir.nlink = dir.nlink.saturating_sub(1);
            }
            dir.touch();
        })?;
        self.with_dir(new_parent, |dir| {
            dir_children(dir).insert(new_name.to_string(), src);
            if src_is_dir {
                dir.nlink += 1;
            }
            dir.touch();
        })?;

        let inode: &mut Inode = self
            .inodes
            .get_mut(&src)
            .ok_or(NullfsError::InodeNotFound(src))?;
        inode.parent = new_parent;
        inode.ctime = SystemTime::now();
        Ok(())
    }

    /// Read from a regular file. See [`Inode::read_at`] for the per-behavior
    /// contract; reads never fail on a regular file.
    pub fn read(&self, ino: InodeId, offset: u64, len: u32) -> Result<Vec<u8>, NullfsError> {
        self.inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .read_at(offset, len)
    }

    /// Write to a regular file. Always accepts the full request; a blackhole
    /// file only advances its metadata. File writes do not touch the parent
    /// directory's timestamps.
    pub fn write(
        &mut self,
        ino: InodeId,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, NullfsError> {
        self.inodes
            .get_mut(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .write_at(offset, data)
    }

    /// Apply metadata changes: chmod, chown, utimens, and size changes.
    /// Size changes only take effect on pass-through files.
    #[allow(clippy::too_many_arguments)]
    pub fn setattr(
        &mut self,
        ino: InodeId,
        mode: Option<u16>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<&Inode, NullfsError> {
        let inode: &mut Inode = self
            .inodes
            .get_mut(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?;
        if let Some(mode) = mode {
            inode.mode = mode & 0o7777;
        }
        if let Some(uid) = uid {
            inode.uid = uid;
        }
        if let Some(gid) = gid {
            inode.gid = gid;
        }
        if let Some(size) = size {
            inode.set_size(size);
        }
        if let Some(atime) = atime {
            inode.atime = atime;
        }
        if let Some(mtime) = mtime {
            inode.mtime = mtime;
        }
        inode.ctime = SystemTime::now();
        Ok(inode)
    }

    /// Target of a symlink.
    pub fn readlink(&self, ino: InodeId) -> Result<&str, NullfsError> {
        match &self
            .inodes
            .get(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?
            .kind
        {
            InodeKind::Symlink { target } => Ok(target),
            _ => Err(NullfsError::InvalidOperation(ino)),
        }
    }

    /// The fixed free-space report. Callers watching free-space thresholds
    /// always see plenty of room.
    pub fn statfs(&self) -> FsStatistics {
        FsStatistics {
            blocks: REPORTED_TOTAL_BLOCKS,
            bfree: REPORTED_FREE_BLOCKS,
            bavail: REPORTED_FREE_BLOCKS,
            files: 0,
            ffree: 0,
            bsize: PAGE_SIZE as u32,
            namelen: NAME_MAX,
            frsize: PAGE_SIZE as u32,
        }
    }

    fn lookup_ino(&self, parent: InodeId, name: &str) -> Result<InodeId, NullfsError> {
        self.children(parent)?
            .get(name)
            .copied()
            .ok_or_else(|| NullfsError::EntryNotFound(name.to_string()))
    }

    fn alloc_ino(&mut self) -> Result<InodeId, NullfsError> {
        let ino: InodeId = self.next_ino;
        self.next_ino = self.next_ino.checked_add(1).ok_or(NullfsError::NoSpace)?;
        Ok(ino)
    }

    /// Allocate a new inode and wire it under `parent`. The parent's
    /// modify/change times are refreshed on every structural mutation.
    fn insert_child(
        &mut self,
        parent: InodeId,
        name: &str,
        kind: InodeKind,
        mode: u16,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId, NullfsError> {
        if self.children(parent)?.contains_key(name) {
            return Err(NullfsError::AlreadyExists(name.to_string()));
        }
        let ino: InodeId = self.alloc_ino()?;
        let uid: u32 = self.opts.uid.unwrap_or(uid);
        let gid: u32 = self.opts.gid.unwrap_or(gid);
        let is_dir: bool = matches!(kind, InodeKind::Directory { .. });
        self.inodes
            .insert(ino, Inode::new(ino, parent, kind, mode, uid, gid));

        self.with_dir(parent, |dir| {
            dir_children(dir).insert(name.to_string(), ino);
            if is_dir {
                dir.nlink += 1;
            }
            dir.touch();
        })?;
        Ok(ino)
    }

    /// Run a mutation against a directory inode.
    fn with_dir(
        &mut self,
        ino: InodeId,
        f: impl FnOnce(&mut Inode),
    ) -> Result<(), NullfsError> {
        let inode: &mut Inode = self
            .inodes
            .get_mut(&ino)
            .ok_or(NullfsError::InodeNotFound(ino))?;
        if !inode.is_dir() {
            return Err(NullfsError::NotADirectory(ino));
        }
        f(inode);
        Ok(())
    }
}

/// Children map of a directory inode. Callers must have checked the kind.
fn dir_children(inode: &mut Inode) -> &mut BTreeMap<String, InodeId> {
    match &mut inode.kind {
        InodeKind::Directory { children } => children,
        _ => unreachable!("caller verified the inode is a directory"),
    }
}
