//! Capability negotiation for the first want line
//!
//! The remote advertises what it supports along with its first ref. The client
//! picks the subset it wants from a fixed, ordered list and appends it to its
//! first `want` line. What was picked is decided once, here, and later phases
//! only read the result.

use bstr::{BStr, BString, ByteSlice};

use crate::{
    config::FetchOptions,
    types::{MultiAckMode, SideBandMode},
};

/// Capability tokens understood by this implementation.
pub mod name {
    /// Send annotated tags pointing into the fetched history
    pub const INCLUDE_TAG: &str = "include-tag";
    /// Acknowledge multiple common commits per round
    pub const MULTI_ACK: &str = "multi_ack";
    /// Like `multi_ack`, distinguishing `common` and `ready`
    pub const MULTI_ACK_DETAILED: &str = "multi_ack_detailed";
    /// Omit delta bases the client has
    pub const THIN_PACK: &str = "thin-pack";
    /// Multiplex progress with pack data, up to 1000 bytes per packet
    pub const SIDE_BAND: &str = "side-band";
    /// Multiplex progress with pack data, up to 65520 bytes per packet
    pub const SIDE_BAND_64K: &str = "side-band-64k";
    /// Deltas may refer to their base by offset
    pub const OFS_DELTA: &str = "ofs-delta";
    /// Shallow clones, recognized but never requested
    pub const SHALLOW: &str = "shallow";
    /// Suppress progress on the side-band
    pub const NO_PROGRESS: &str = "no-progress";
}

/// The capabilities the remote advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCapabilities {
    entries: Vec<(BString, Option<BString>)>,
}

impl RemoteCapabilities {
    /// Parse a space separated capability list such as the one following the `\0` of the first advertised ref.
    pub fn from_bytes(input: &[u8]) -> Self {
        let entries = input
            .trim()
            .split_str(" ")
            .filter(|token| !token.is_empty())
            .map(|token| match token.split_once_str("=") {
                Some((name, value)) => (name.into(), Some(value.into())),
                None => (token.into(), None),
            })
            .collect();
        Self { entries }
    }

    /// Return `true` if the named capability is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Return the value of a `name=value` capability.
    pub fn value(&self, name: &str) -> Option<&BStr> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref().map(|v| v.as_bstr()))
    }

    /// Iterate over all capability names.
    pub fn names(&self) -> impl Iterator<Item = &BStr> + '_ {
        self.entries.iter().map(|(n, _)| n.as_bstr())
    }
}

impl<'a> FromIterator<&'a str> for RemoteCapabilities {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|name| (name.into(), None)).collect(),
        }
    }
}

/// The outcome of capability negotiation: what both sides agreed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiated {
    /// The capabilities to append to the first want line, each preceded by a space
    pub want_suffix: String,
    /// How the remote will acknowledge haves
    pub multi_ack: MultiAckMode,
    /// Whether the pack may be thin
    pub thin_pack: bool,
    /// Whether and how pack data is multiplexed with progress
    pub side_band: SideBandMode,
    /// Whether the remote will include tags
    pub include_tag: bool,
    /// Whether offset deltas may be used
    pub ofs_delta: bool,
    /// Whether the remote was asked not to send progress
    pub no_progress: bool,
}

impl Negotiated {
    /// Return the names of all accepted capabilities, in the order they were requested.
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.want_suffix.split(' ').filter(|token| !token.is_empty())
    }
}

/// Decide which of the `requested` features to use given what the remote `offered`.
pub fn negotiate(requested: &FetchOptions, offered: &RemoteCapabilities) -> Negotiated {
    let mut out = Negotiated::default();
    let mut want = |name: &str| {
        let available = offered.contains(name);
        if available {
            out.want_suffix.push(' ');
            out.want_suffix.push_str(name);
        }
        available
    };

    let include_tag = requested.include_tags && want(name::INCLUDE_TAG);
    let ofs_delta = requested.allow_ofs_delta && want(name::OFS_DELTA);
    let multi_ack = if want(name::MULTI_ACK_DETAILED) {
        MultiAckMode::Detailed
    } else if want(name::MULTI_ACK) {
        MultiAckMode::Continue
    } else {
        MultiAckMode::Off
    };
    let thin_pack = requested.thin_pack && want(name::THIN_PACK);
    let side_band = if want(name::SIDE_BAND_64K) {
        SideBandMode::SideBand64k
    } else if want(name::SIDE_BAND) {
        SideBandMode::Basic
    } else {
        SideBandMode::None
    };
    let no_progress = requested.no_progress && want(name::NO_PROGRESS);

    out.include_tag = include_tag;
    out.ofs_delta = ofs_delta;
    out.multi_ack = multi_ack;
    out.thin_pack = thin_pack;
    out.side_band = side_band;
    out.no_progress = no_progress;
    out
}
