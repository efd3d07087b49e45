//! FUSE dispatch layer.
//!
//! Maps kernel requests onto the [`Namespace`]. The kernel owns path
//! resolution, permission checks, and open-handle reference counting; this
//! layer only translates between FUSE replies and namespace operations and
//! maps crate errors to errnos.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr,
    Request, TimeOrNow,
};

use crate::error::NullfsError;
use crate::inode::{Inode, InodeKind, SpecialKind, BLOCK_SIZE};
use crate::namespace::{FsStatistics, Namespace};

/// TTL for attributes and entries handed to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// Map a crate error to the errno reported to the kernel.
fn errno(err: &NullfsError) -> i32 {
    match err {
        NullfsError::NoSpace => libc::ENOSPC,
        NullfsError::InvalidOption { .. } => libc::EINVAL,
        NullfsError::InodeNotFound(_) | NullfsError::EntryNotFound(_) => libc::ENOENT,
        NullfsError::NotADirectory(_) => libc::ENOTDIR,
        NullfsError::IsADirectory(_) => libc::EISDIR,
        NullfsError::AlreadyExists(_) => libc::EEXIST,
        NullfsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
        NullfsError::InvalidOperation(_) => libc::EINVAL,
        NullfsError::MountFailed(_) => libc::EIO,
    }
}

fn file_type(inode: &Inode) -> FileType {
    match &inode.kind {
        InodeKind::Directory { .. } => FileType::Directory,
        InodeKind::File { .. } => FileType::RegularFile,
        InodeKind::Symlink { .. } => FileType::Symlink,
        InodeKind::Special { kind, .. } => match kind {
            SpecialKind::CharDevice => FileType::CharDevice,
            SpecialKind::BlockDevice => FileType::BlockDevice,
            SpecialKind::Fifo => FileType::NamedPipe,
            SpecialKind::Socket => FileType::Socket,
        },
    }
}

/// Convert an inode record to FUSE file attributes.
fn to_file_attr(inode: &Inode) -> FileAttr {
    let rdev: u32 = match &inode.kind {
        InodeKind::Special { rdev, .. } => *rdev,
        _ => 0,
    };

    FileAttr {
        ino: inode.ino,
        size: inode.size,
        blocks: inode.blocks,
        atime: inode.atime,
        mtime: inode.mtime,
        ctime: inode.ctime,
        crtime: UNIX_EPOCH,
        kind: file_type(inode),
        perm: inode.mode,
        nlink: inode.nlink,
        uid: inode.uid,
        gid: inode.gid,
        rdev,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn time_or_now(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

/// The mounted filesystem: a namespace driven by kernel requests.
pub struct Nullfs {
    ns: Namespace,
    next_handle: AtomicU64,
}

impl Nullfs {
    /// Wrap a namespace for mounting.
    pub fn new(ns: Namespace) -> Self {
        Self {
            ns,
            next_handle: AtomicU64::new(1),
        }
    }

    /// The underlying namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Reply with the entry for a freshly created inode.
    fn reply_entry(&self, ino: u64, reply: ReplyEntry) {
        match self.ns.get(ino) {
            Some(inode) => reply.entry(&TTL, &to_file_attr(inode), 0),
            None => reply.error(libc::ENOENT),
        }
    }
}

impl Filesystem for Nullfs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.ns.lookup(parent, name_str) {
            Ok(inode) => reply.entry(&TTL, &to_file_attr(inode), 0),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.ns.get(ino) {
            Some(inode) => reply.attr(&TTL, &to_file_attr(inode)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mode: Option<u16> = mode.map(|m| (m & 0o7777) as u16);
        let atime: Option<SystemTime> = atime.map(time_or_now);
        let mtime: Option<SystemTime> = mtime.map(time_or_now);

        match self.ns.setattr(ino, mode, uid, gid, size, atime, mtime) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(inode)),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        let perm: u16 = (mode & 0o7777) as u16;
        let (uid, gid) = (req.uid(), req.gid());

        let special: SpecialKind = match mode & libc::S_IFMT {
            0 | libc::S_IFREG => {
                match self.ns.create_file(parent, name_str, perm, uid, gid) {
                    Ok(ino) => self.reply_entry(ino, reply),
                    Err(e) => reply.error(errno(&e)),
                }
                return;
            }
            libc::S_IFCHR => SpecialKind::CharDevice,
            libc::S_IFBLK => SpecialKind::BlockDevice,
            libc::S_IFIFO => SpecialKind::Fifo,
            libc::S_IFSOCK => SpecialKind::Socket,
            _ => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.ns.mknod(parent, name_str, special, perm, rdev, uid, gid) {
            Ok(ino) => self.reply_entry(ino, reply),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self
            .ns
            .mkdir(parent, name_str, (mode & 0o7777) as u16, req.uid(), req.gid())
        {
            Ok(ino) => self.reply_entry(ino, reply),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.ns.unlink(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.ns.rmdir(parent, name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn symlink(
        &mut self,
        req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let (name_str, target_str) = match (link_name.to_str(), target.to_str()) {
            (Some(n), Some(t)) => (n, t),
            _ => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self
            .ns
            .symlink(parent, name_str, target_str, req.uid(), req.gid())
        {
            Ok(ino) => self.reply_entry(ino, reply),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (name_str, newname_str) = match (name.to_str(), newname.to_str()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.ns.rename(parent, name_str, newparent, newname_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let name_str: &str = match newname.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.ns.link(ino, newparent, name_str) {
            Ok(()) => self.reply_entry(ino, reply),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.ns.get(ino) {
            Some(inode) if inode.is_dir() => reply.error(libc::EISDIR),
            Some(_) => {
                let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
                reply.opened(fh, 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        match self.ns.read(ino, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                tracing::error!(ino, error = %e, "read failed");
                reply.error(errno(&e));
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.ns.write(ino, offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                tracing::error!(ino, error = %e, "write failed");
                reply.error(errno(&e));
            }
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        // Nothing to persist, ever.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let parent: u64 = match self.ns.get(ino) {
            Some(inode) if inode.is_dir() => inode.parent,
            Some(_) => {
                reply.error(libc::ENOTDIR);
                return;
            }
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent, FileType::Directory, "..".to_string()),
        ];

        match self.ns.children(ino) {
            Ok(children) => {
                for (name, child_ino) in children {
                    if let Some(child) = self.ns.get(*child_ino) {
                        entries.push((*child_ino, file_type(child), name.clone()));
                    }
                }
            }
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        }

        for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.ns.readlink(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.ns.create_file(
            parent,
            name_str,
            (mode & 0o7777) as u16,
            req.uid(),
            req.gid(),
        ) {
            Ok(ino) => {
                let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
                match self.ns.get(ino) {
                    Some(inode) => reply.created(&TTL, &to_file_attr(inode), 0, fh, 0),
                    None => reply.error(libc::ENOENT),
                }
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats: FsStatistics = self.ns.statfs();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.frsize,
        );
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        // ACLs and xattrs are accepted but never stored.
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        _name: &OsStr,
        _size: u32,
        reply: ReplyXattr,
    ) {
        reply.error(libc::ENODATA);
    }
}

/// Mount a namespace and block until it is unmounted.
///
/// # Arguments
/// * `ns` - Namespace to serve
/// * `mountpoint` - Path to mount at
pub fn mount(ns: Namespace, mountpoint: &Path) -> Result<(), NullfsError> {
    fuser::mount2(Nullfs::new(ns), mountpoint, &mount_options())
        .map_err(|e| NullfsError::MountFailed(e.to_string()))
}

/// Mount a namespace in the background.
///
/// # Returns
/// Session handle; dropping it unmounts.
pub fn spawn_mount(
    ns: Namespace,
    mountpoint: &Path,
) -> Result<fuser::BackgroundSession, NullfsError> {
    fuser::spawn_mount2(Nullfs::new(ns), mountpoint, &mount_options())
        .map_err(|e| NullfsError::MountFailed(e.to_string()))
}

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName("nullfs".into()),
        MountOption::DefaultPermissions,
        MountOption::AutoUnmount,
    ]
}
