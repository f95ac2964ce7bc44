//! Common types and structures used throughout fetch negotiation

use bstr::BString;
use gix_date::SecondsSinceUnixEpoch;
use gix_hash::ObjectId;
use smallvec::SmallVec;

/// A named pointer advertised by the remote or held locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// The fully qualified reference name
    pub name: BString,
    /// The object the reference points to
    pub object_id: ObjectId,
    /// The object an annotated tag ultimately points to, if known
    pub peeled_id: Option<ObjectId>,
}

impl Ref {
    /// Create a reference without peeled target.
    pub fn new(name: impl Into<BString>, object_id: ObjectId) -> Self {
        Self {
            name: name.into(),
            object_id,
            peeled_id: None,
        }
    }

    /// Set the peeled target of an annotated tag.
    pub fn with_peeled(mut self, peeled: ObjectId) -> Self {
        self.peeled_id = Some(peeled);
        self
    }
}

/// A commit as far as negotiation is concerned: its id, parents and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode {
    /// The commit id
    pub id: ObjectId,
    /// Parent commit ids, in order
    pub parents: SmallVec<[ObjectId; 1]>,
    /// Committer time in seconds since the epoch
    pub commit_time: SecondsSinceUnixEpoch,
}

impl CommitNode {
    /// Create a new commit node.
    pub fn new(id: ObjectId, parents: impl IntoIterator<Item = ObjectId>, commit_time: SecondsSinceUnixEpoch) -> Self {
        Self {
            id,
            parents: parents.into_iter().collect(),
            commit_time,
        }
    }
}

bitflags::bitflags! {
    /// Per-commit markers maintained by the [`Walker`](crate::walk::Walker).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// Reachable from a local ref or an explicit have.
        const REACHABLE = 1 << 0;
        /// Known to the remote through its ref advertisement.
        const ADVERTISED = 1 << 1;
        /// Proven to be known by both sides.
        const COMMON = 1 << 2;
        /// Queued during the current traversal. Never carried.
        const SEEN = 1 << 3;
    }
}

impl Flags {
    /// Markers that propagate from a commit to its ancestors.
    pub const CARRIED: Flags = Flags::REACHABLE.union(Flags::ADVERTISED).union(Flags::COMMON);
}

/// Multi-ack modes for negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiAckMode {
    /// The remote acknowledges only once, when it is ready to send a pack
    #[default]
    Off,
    /// `multi_ack`: the remote answers `ACK <id> continue` for each common have
    Continue,
    /// `multi_ack_detailed`: the remote distinguishes `common` and `ready`
    Detailed,
}

/// Side-band modes for multiplexed communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SideBandMode {
    /// Pack data follows negotiation as raw bytes
    #[default]
    None,
    /// Basic side-band (up to 1000 bytes per packet)
    Basic,
    /// Side-band 64k (up to 65520 bytes per packet)
    SideBand64k,
}

impl SideBandMode {
    /// Return `true` if pack data arrives multiplexed with progress.
    pub fn is_enabled(self) -> bool {
        self != SideBandMode::None
    }
}

/// A single response to a have batch or to `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckNak {
    /// `NAK`: no common commit found in the last batch
    Nak,
    /// `ACK <id>`: the remote is ready to send the pack
    Ack,
    /// `ACK <id> continue`
    Continue,
    /// `ACK <id> common`
    Common,
    /// `ACK <id> ready`
    Ready,
}

impl AckNak {
    /// Return `true` for the `continue`, `common` and `ready` variants.
    pub fn is_continuation(self) -> bool {
        matches!(self, AckNak::Continue | AckNak::Common | AckNak::Ready)
    }
}

/// A single framed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketLine {
    /// A data packet with its payload
    Data(BString),
    /// The `0000` flush packet
    Flush,
}

impl PacketLine {
    /// Return the payload of a data packet.
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            PacketLine::Data(d) => Some(d.as_slice()),
            PacketLine::Flush => None,
        }
    }

    /// Return `true` if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, PacketLine::Flush)
    }
}

/// Protocol constants
pub mod protocol {
    /// Haves sent between two flushes.
    pub const HAVES_PER_ROUND: usize = 32;
    /// Haves sent without a positive continuation after which negotiation gives up.
    pub const MAX_IN_VAIN: usize = 256;

    /// Prefix of a want line
    pub const WANT: &str = "want ";
    /// Prefix of a have line
    pub const HAVE: &str = "have ";
    /// Sent once no more haves will follow
    pub const DONE: &str = "done\n";
    /// Negative acknowledgement
    pub const NAK: &str = "NAK";
    /// Prefix of all positive acknowledgements
    pub const ACK_PREFIX: &str = "ACK ";
    /// `multi_ack` continuation suffix
    pub const ACK_CONTINUE_SUFFIX: &str = " continue";
    /// `multi_ack_detailed` common suffix
    pub const ACK_COMMON_SUFFIX: &str = " common";
    /// `multi_ack_detailed` ready suffix
    pub const ACK_READY_SUFFIX: &str = " ready";
}
