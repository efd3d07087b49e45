//! Integration tests for the file policy matrix.
//!
//! Covers the interaction of the write-allow pattern, the live exclude rule,
//! and the two file behaviors across namespace operations:
//! - classification at create time (write=, exclude, both, neither)
//! - blackhole size/block accounting and read clipping
//! - pass-through write/read round trips
//! - rename and pattern changes never reclassifying existing files
//! - the exclude rule shared across mounts
//! - mount option display and the fixed statistics report

use nullfs::{
    ExcludeRule, FileBehavior, FsStatistics, Inode, InodeId, MountOptions, Namespace, ROOT_INO,
};

/// Helper to build a namespace from an option string and a fresh exclude rule.
fn mount(options: &str) -> Namespace {
    Namespace::new(MountOptions::parse(options).unwrap(), ExcludeRule::new())
}

fn behavior_of(ns: &Namespace, ino: InodeId) -> FileBehavior {
    ns.get(ino).unwrap().behavior().unwrap()
}

// =============================================================================
// CLASSIFICATION AT CREATE
// =============================================================================

mod classification {
    use super::*;

    #[test]
    fn test_no_patterns_everything_is_blackhole() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "data.bin", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, f), FileBehavior::Blackhole);
    }

    #[test]
    fn test_write_pattern_selects_pass_through() {
        let mut ns: Namespace = mount("write=keep");
        let keep: InodeId = ns.create_file(ROOT_INO, "keep.txt", 0o644, 0, 0).unwrap();
        let other: InodeId = ns.create_file(ROOT_INO, "other.txt", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, keep), FileBehavior::PassThrough);
        assert_eq!(behavior_of(&ns, other), FileBehavior::Blackhole);
    }

    #[test]
    fn test_exclude_rule_works_without_write_pattern() {
        let exclude: ExcludeRule = ExcludeRule::new();
        exclude.set("log");
        let mut ns: Namespace = Namespace::new(MountOptions::default(), exclude);

        let log: InodeId = ns.create_file(ROOT_INO, "app.log", 0o644, 0, 0).unwrap();
        let dat: InodeId = ns.create_file(ROOT_INO, "app.dat", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, log), FileBehavior::PassThrough);
        assert_eq!(behavior_of(&ns, dat), FileBehavior::Blackhole);
    }

    #[test]
    fn test_exclude_change_affects_only_later_creates() {
        let mut ns: Namespace = mount("");
        let before: InodeId = ns.create_file(ROOT_INO, "trace.out", 0o644, 0, 0).unwrap();
        ns.exclude().set("trace");
        let after: InodeId = ns.create_file(ROOT_INO, "trace2.out", 0o644, 0, 0).unwrap();

        assert_eq!(behavior_of(&ns, before), FileBehavior::Blackhole);
        assert_eq!(behavior_of(&ns, after), FileBehavior::PassThrough);
    }

    #[test]
    fn test_write_option_seeds_exclude_rule() {
        let exclude: ExcludeRule = ExcludeRule::new();
        let _first: Namespace =
            Namespace::new(MountOptions::parse("write=keep").unwrap(), exclude.clone());
        assert_eq!(exclude.get(), "keep");

        // A second mount sharing the rule classifies by the seeded pattern
        // even without its own write= option.
        let mut second: Namespace = Namespace::new(MountOptions::default(), exclude);
        let f: InodeId = second
            .create_file(ROOT_INO, "keep_me.txt", 0o644, 0, 0)
            .unwrap();
        assert_eq!(behavior_of(&second, f), FileBehavior::PassThrough);
    }

    #[test]
    fn test_symlinks_are_never_blackholed() {
        let mut ns: Namespace = mount("");
        let l: InodeId = ns.symlink(ROOT_INO, "link", "somewhere", 0, 0).unwrap();
        assert!(ns.get(l).unwrap().behavior().is_none());
        assert_eq!(ns.readlink(l).unwrap(), "somewhere");
    }
}

// =============================================================================
// BLACKHOLE ACCOUNTING
// =============================================================================

mod blackhole {
    use super::*;

    #[test]
    fn test_size_is_sum_of_writes_and_blocks_count_calls() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "sink", 0o644, 0, 0).unwrap();

        let lengths: [usize; 4] = [100, 1, 4096, 50];
        for (i, len) in lengths.iter().enumerate() {
            // Offsets are deliberately scattered; they must not matter.
            let accepted: usize = ns.write(f, (i * 7) as u64, &vec![0xAB; *len]).unwrap();
            assert_eq!(accepted, *len);
        }

        let inode: &Inode = ns.get(f).unwrap();
        assert_eq!(inode.size, 100 + 1 + 4096 + 50);
        assert_eq!(inode.blocks, 4);
    }

    #[test]
    fn test_read_at_eof_returns_nothing() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "sink", 0o644, 0, 0).unwrap();
        ns.write(f, 0, &[0u8; 100]).unwrap();

        assert!(ns.read(f, 100, 10).unwrap().is_empty());
        assert!(ns.read(f, 101, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_before_eof_is_clipped() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "sink", 0o644, 0, 0).unwrap();
        ns.write(f, 0, &[0u8; 100]).unwrap();

        assert_eq!(ns.read(f, 0, 30).unwrap().len(), 30);
        assert_eq!(ns.read(f, 80, 30).unwrap().len(), 20);
    }

    #[test]
    fn test_write_updates_file_mtime() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "sink", 0o644, 0, 0).unwrap();
        let before = ns.get(f).unwrap().mtime;
        std::thread::sleep(std::time::Duration::from_millis(5));
        ns.write(f, 0, b"gone").unwrap();
        assert!(ns.get(f).unwrap().mtime > before);
    }
}

// =============================================================================
// PASS-THROUGH SEMANTICS
// =============================================================================

mod pass_through {
    use super::*;

    #[test]
    fn test_write_read_round_trip_is_exact() {
        let mut ns: Namespace = mount("write=keep");
        let f: InodeId = ns.create_file(ROOT_INO, "keep.txt", 0o644, 0, 0).unwrap();

        ns.write(f, 0, b"hello ").unwrap();
        ns.write(f, 6, b"world").unwrap();
        assert_eq!(ns.read(f, 0, 100).unwrap(), b"hello world");
        assert_eq!(ns.get(f).unwrap().size, 11);
    }

    #[test]
    fn test_fifty_bytes_written_read_back() {
        let mut ns: Namespace = mount("write=keep");
        let f: InodeId = ns.create_file(ROOT_INO, "keep.txt", 0o644, 0, 0).unwrap();

        let payload: Vec<u8> = (0..50u8).collect();
        assert_eq!(ns.write(f, 0, &payload).unwrap(), 50);
        assert_eq!(ns.read(f, 0, 50).unwrap(), payload);
    }
}

// =============================================================================
// BEHAVIOR IS PERMANENT
// =============================================================================

mod permanence {
    use super::*;

    #[test]
    fn test_rename_never_reclassifies() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "a", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, f), FileBehavior::Blackhole);

        // The new name would classify as pass-through under the current rule,
        // but the behavior was bound at creation.
        ns.exclude().set("a");
        ns.rename(ROOT_INO, "a", ROOT_INO, "a2").unwrap();
        assert_eq!(behavior_of(&ns, f), FileBehavior::Blackhole);

        // A sibling created now does match.
        let g: InodeId = ns.create_file(ROOT_INO, "a3", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, g), FileBehavior::PassThrough);
    }

    #[test]
    fn test_pattern_change_does_not_reclassify_existing() {
        let mut ns: Namespace = mount("write=keep");
        let f: InodeId = ns.create_file(ROOT_INO, "keep.txt", 0o644, 0, 0).unwrap();

        ns.exclude().set("nothing-matches-this");
        ns.write(f, 0, b"still stored").unwrap();
        assert_eq!(ns.read(f, 0, 100).unwrap(), b"still stored");
    }

    #[test]
    fn test_rename_keeps_blackhole_accounting() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "a", 0o644, 0, 0).unwrap();
        ns.write(f, 0, &[0u8; 64]).unwrap();
        ns.rename(ROOT_INO, "a", ROOT_INO, "b").unwrap();
        ns.write(f, 0, &[0u8; 36]).unwrap();

        let inode: &Inode = ns.get(f).unwrap();
        assert_eq!(inode.size, 100);
        assert_eq!(inode.blocks, 2);
    }
}

// =============================================================================
// MOUNT SCENARIOS
// =============================================================================

mod scenarios {
    use super::*;

    /// The reference scenario: mount with write=keep, mix both behaviors.
    #[test]
    fn test_write_keep_mount_scenario() {
        let mut ns: Namespace = mount("write=keep");

        let keep: InodeId = ns.create_file(ROOT_INO, "keep.txt", 0o644, 0, 0).unwrap();
        let other: InodeId = ns.create_file(ROOT_INO, "other.txt", 0o644, 0, 0).unwrap();
        assert_eq!(behavior_of(&ns, keep), FileBehavior::PassThrough);
        assert_eq!(behavior_of(&ns, other), FileBehavior::Blackhole);

        ns.write(other, 0, &[7u8; 100]).unwrap();
        assert_eq!(ns.get(other).unwrap().size, 100);
        assert!(ns.read(other, 100, 10).unwrap().is_empty());

        let payload: Vec<u8> = (0..50u8).collect();
        ns.write(keep, 0, &payload).unwrap();
        assert_eq!(ns.read(keep, 0, 50).unwrap(), payload);
    }

    #[test]
    fn test_directory_tree_with_blackhole_files() {
        let mut ns: Namespace = mount("");
        let d: InodeId = ns.mkdir(ROOT_INO, "d", 0o755, 0, 0).unwrap();
        let f: InodeId = ns.create_file(d, "f", 0o644, 0, 0).unwrap();

        // Removing the non-empty directory is rejected; the tree stays intact.
        assert!(ns.rmdir(ROOT_INO, "d").is_err());
        assert_eq!(ns.lookup(d, "f").unwrap().ino, f);
        assert_eq!(ns.children(d).unwrap().len(), 1);

        ns.unlink(d, "f").unwrap();
        ns.rmdir(ROOT_INO, "d").unwrap();
        assert_eq!(ns.inode_count(), 1);
    }

    #[test]
    fn test_show_options_round_trip() {
        let ns: Namespace = mount("write=keep,uid=1000");
        assert_eq!(ns.show_options(), "write=keep,uid=1000");

        let ns: Namespace = mount("");
        assert_eq!(ns.show_options(), "");
    }

    #[test]
    fn test_statfs_always_reports_free_space() {
        let mut ns: Namespace = mount("");
        let f: InodeId = ns.create_file(ROOT_INO, "huge", 0o644, 0, 0).unwrap();
        // Pretend-write a lot of data; the report must not move.
        for _ in 0..100 {
            ns.write(f, 0, &[0u8; 1 << 20]).unwrap();
        }

        let stats: FsStatistics = ns.statfs();
        assert_eq!(stats.blocks, 100_000_000);
        assert_eq!(stats.bfree, 90_000_000);
        assert_eq!(stats.bavail, 90_000_000);
    }
}
