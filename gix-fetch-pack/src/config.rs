//! Configuration of a fetch negotiation

use bstr::{BStr, ByteSlice};

use crate::{Error, Result};

/// Options controlling which optional protocol features a fetch asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ask the remote to include annotated tags pointing into the fetched history
    pub include_tags: bool,

    /// Accept thin packs whose delta bases must be completed from the local store
    pub thin_pack: bool,

    /// Accept deltas encoded against a relative offset (`repack.useDeltaBaseOffset`)
    pub allow_ofs_delta: bool,

    /// Have the pack indexer validate every received object (`fetch.fsckObjects`)
    pub check_objects: bool,

    /// Ask the remote to suppress progress messages
    pub no_progress: bool,

    /// Human-readable description for the lock held on the received pack
    pub lock_message: Option<String>,

    /// `fetch.fsckObjects` as last configured, which takes precedence over `transfer.fsckObjects`
    fetch_fsck_objects: Option<bool>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_tags: true,
            thin_pack: true,
            allow_ofs_delta: true,
            check_objects: false,
            no_progress: false,
            lock_message: None,
            fetch_fsck_objects: None,
        }
    }
}

impl FetchOptions {
    /// Create new fetch options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable tag inclusion
    pub fn with_include_tags(mut self, include: bool) -> Self {
        self.include_tags = include;
        self
    }

    /// Enable or disable thin packs
    pub fn with_thin_pack(mut self, thin: bool) -> Self {
        self.thin_pack = thin;
        self
    }

    /// Enable or disable offset deltas
    pub fn with_ofs_delta(mut self, allow: bool) -> Self {
        self.allow_ofs_delta = allow;
        self
    }

    /// Enable or disable object validation while indexing
    pub fn with_check_objects(mut self, check: bool) -> Self {
        self.check_objects = check;
        self
    }

    /// Ask the remote not to send progress
    pub fn with_no_progress(mut self, no_progress: bool) -> Self {
        self.no_progress = no_progress;
        self
    }

    /// Set the message describing the pack lock
    pub fn with_lock_message(mut self, message: impl Into<String>) -> Self {
        self.lock_message = Some(message.into());
        self
    }

    /// Apply a single git configuration value, with `key` in `section[.subsection].name` form.
    ///
    /// Keys not affecting negotiation are ignored.
    pub fn apply_config(&mut self, key: &str, value: &str) -> Result<()> {
        let lower = key.to_ascii_lowercase();
        match lower.as_str() {
            "repack.usedeltabaseoffset" => self.allow_ofs_delta = boolean(key, value)?,
            "fetch.fsckobjects" => {
                let check = boolean(key, value)?;
                self.fetch_fsck_objects = Some(check);
                self.check_objects = check;
            }
            "transfer.fsckobjects" => {
                let check = boolean(key, value)?;
                self.check_objects = self.fetch_fsck_objects.unwrap_or(check);
            }
            "fetch.thin" => self.thin_pack = boolean(key, value)?,
            _ if is_remote_tag_opt(&lower) => match value {
                "--no-tags" => self.include_tags = false,
                "--tags" => self.include_tags = true,
                _ => {
                    return Err(Error::Config {
                        message: format!("{key}: expected '--tags' or '--no-tags', got '{value}'"),
                    })
                }
            },
            _ => {}
        }
        Ok(())
    }

    /// Build options from `(key, value)` pairs, later values overriding earlier ones.
    pub fn from_config<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut options = Self::default();
        for (key, value) in entries {
            options.apply_config(key, value)?;
        }
        Ok(options)
    }
}

/// `remote.<name>.tagopt`, with a non-empty remote name that may contain dots.
fn is_remote_tag_opt(key: &str) -> bool {
    key.strip_prefix("remote.")
        .and_then(|rest| rest.strip_suffix(".tagopt"))
        .map_or(false, |name| !name.is_empty())
}

fn boolean(key: &str, value: &str) -> Result<bool> {
    let value: &BStr = value.as_bytes().as_bstr();
    gix_config_value::Boolean::try_from(value)
        .map(|b| b.0)
        .map_err(|err| Error::Config {
            message: format!("{key}: {err}"),
        })
}
