//! Mount options.
//!
//! Options arrive as a comma-separated `key=value` string in the usual
//! mount(8) syntax: `write=<pattern>`, `mode=<octal>`,
//! `uid=<int>`, `gid=<int>`. Unknown keys are ignored; malformed numeric
//! values fail the mount with [`NullfsError::InvalidOption`]. The active
//! options render back into the same syntax, omitting keys at their default.

use std::fmt;

use crate::error::NullfsError;

/// Default permission bits for the root directory.
pub const DEFAULT_MODE: u16 = 0o755;

/// Parsed mount options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Write-allow pattern: file names containing it are pass-through.
    /// Fixed for the mount's lifetime.
    pub write: Option<String>,
    /// Root directory permission bits.
    pub mode: u16,
    /// Owner for new inodes; `None` inherits the creating caller's uid.
    pub uid: Option<u32>,
    /// Group for new inodes; `None` inherits the creating caller's gid.
    pub gid: Option<u32>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            write: None,
            mode: DEFAULT_MODE,
            uid: None,
            gid: None,
        }
    }
}

impl MountOptions {
    /// Parse a comma-separated option string.
    ///
    /// Empty segments are skipped and unknown keys are ignored. A numeric
    /// option that fails to parse fails the whole mount; there is no partial
    /// mount with defaults.
    ///
    /// # Arguments
    /// * `data` - Option string, e.g. `"write=keep,mode=0700,uid=1000"`
    pub fn parse(data: &str) -> Result<Self, NullfsError> {
        let mut opts: MountOptions = MountOptions::default();

        for part in data.split(',') {
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            match key {
                "write" => {
                    opts.write = Some(value.to_string());
                }
                "mode" => {
                    let mode: u32 = u32::from_str_radix(value, 8).map_err(|_| {
                        NullfsError::InvalidOption {
                            option: "mode".to_string(),
                            value: value.to_string(),
                        }
                    })?;
                    opts.mode = (mode & 0o7777) as u16;
                }
                "uid" => {
                    let uid: u32 =
                        value
                            .parse()
                            .map_err(|_| NullfsError::InvalidOption {
                                option: "uid".to_string(),
                                value: value.to_string(),
                            })?;
                    opts.uid = Some(uid);
                }
                "gid" => {
                    let gid: u32 =
                        value
                            .parse()
                            .map_err(|_| NullfsError::InvalidOption {
                                option: "gid".to_string(),
                                value: value.to_string(),
                            })?;
                    opts.gid = Some(gid);
                }
                _ => {}
            }
        }

        if let Some(pattern) = &opts.write {
            tracing::info!(pattern = %pattern, "will keep data for files matching pattern");
        }
        Ok(opts)
    }
}

impl fmt::Display for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(pattern) = &self.write {
            parts.push(format!("write={}", pattern));
        }
        if let Some(uid) = self.uid {
            parts.push(format!("uid={}", uid));
        }
        if let Some(gid) = self.gid {
            parts.push(format!("gid={}", gid));
        }
        if self.mode != DEFAULT_MODE {
            parts.push(format!("mode={:o}", self.mode));
        }
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts: MountOptions = MountOptions::parse("").unwrap();
        assert_eq!(opts, MountOptions::default());
        assert_eq!(opts.mode, 0o755);
        assert!(opts.write.is_none());
        assert!(opts.uid.is_none());
        assert!(opts.gid.is_none());
    }

    #[test]
    fn test_parse_all_keys() {
        let opts: MountOptions = MountOptions::parse("write=keep,mode=0700,uid=1000,gid=1000").unwrap();
        assert_eq!(opts.write.as_deref(), Some("keep"));
        assert_eq!(opts.mode, 0o700);
        assert_eq!(opts.uid, Some(1000));
        assert_eq!(opts.gid, Some(1000));
    }

    #[test]
    fn test_mode_is_octal_and_masked() {
        let opts: MountOptions = MountOptions::parse("mode=1777").unwrap();
        assert_eq!(opts.mode, 0o1777);
        // Type bits above 0o7777 are masked off.
        let opts: MountOptions = MountOptions::parse("mode=100644").unwrap();
        assert_eq!(opts.mode, 0o644);
    }

    #[test]
    fn test_unknown_keys_and_empty_segments_ignored() {
        let opts: MountOptions = MountOptions::parse(",noatime,size=10m,,write=keep,").unwrap();
        assert_eq!(opts.write.as_deref(), Some("keep"));
    }

    #[test]
    fn test_malformed_numbers_fail_mount() {
        assert!(matches!(
            MountOptions::parse("uid=abc"),
            Err(NullfsError::InvalidOption { .. })
        ));
        assert!(matches!(
            MountOptions::parse("gid=-1"),
            Err(NullfsError::InvalidOption { .. })
        ));
        assert!(matches!(
            MountOptions::parse("mode=9"),
            Err(NullfsError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_display_omits_defaults() {
        let opts: MountOptions = MountOptions::default();
        assert_eq!(opts.to_string(), "");

        let opts: MountOptions = MountOptions::parse("write=keep,uid=1000").unwrap();
        assert_eq!(opts.to_string(), "write=keep,uid=1000");

        let opts: MountOptions = MountOptions::parse("mode=0700").unwrap();
        assert_eq!(opts.to_string(), "mode=700");
    }

    #[test]
    fn test_display_round_trip() {
        let opts: MountOptions = MountOptions::parse("write=keep,mode=0700,uid=1,gid=2").unwrap();
        let rendered: String = opts.to_string();
        assert_eq!(MountOptions::parse(&rendered).unwrap(), opts);
    }
}
