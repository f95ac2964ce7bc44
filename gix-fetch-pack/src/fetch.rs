//! The client side of a fetch: wants, have negotiation and pack reception
//!
//! A [`Session`] moves through the phases of a fetch in order and owns
//! everything the negotiation needs. It is consumed by [`Session::fetch()`], so
//! the walker with its per-commit state and both halves of the transport are
//! released together however the fetch ends.

use std::io::{Read, Write};

use bstr::ByteSlice;
use gix_hash::ObjectId;
use gix_packetline::PacketLineRef;

use crate::{
    capabilities::{self, Negotiated, RemoteCapabilities},
    config::FetchOptions,
    error::{Error, Result},
    interrupt::CancellationPoint,
    pack::{self, IndexOptions, PackIndexer},
    packetline::{PacketLineIn, PacketLineOut},
    progress::ProgressSink,
    store::ObjectStore,
    types::{protocol, AckNak, MultiAckMode, PacketLine, Ref},
    walk::Walker,
};

/// The phases of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Nothing happened yet
    #[default]
    Idle,
    /// Learning what the remote has
    Advertising,
    /// Telling the remote what we want
    SendingWants,
    /// Offering haves in batches
    Negotiating,
    /// `done` was sent, reading the outstanding acknowledgements
    Draining,
    /// Reading the pack
    ReceivingPack,
    /// The fetch completed
    Done,
    /// The progress sink asked to stop
    Cancelled,
    /// The transport, the remote or the indexer failed
    Failed,
}

impl State {
    /// Return `true` if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Cancelled | State::Failed)
    }
}

/// Bookkeeping of the have exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationRound {
    /// Haves written so far
    pub haves_sent: usize,
    /// Haves written since the last positive acknowledgement
    pub haves_since_continue: usize,
    /// Flushed have batches whose response wasn't read yet
    pub pending: usize,
    /// How the remote acknowledges, downgraded as negotiation ends
    pub multi_ack: MultiAckMode,
    /// Any `ACK` was received
    pub received_ack: bool,
    /// Any `ACK <id> continue|common|ready` was received
    pub received_continue: bool,
}

/// The references and capabilities announced by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// All advertised references, with peeled targets of annotated tags
    pub refs: Vec<Ref>,
    /// The capabilities attached to the first reference
    pub capabilities: RemoteCapabilities,
}

impl Advertisement {
    /// Create an advertisement from its parts.
    pub fn new(refs: Vec<Ref>, capabilities: RemoteCapabilities) -> Self {
        Advertisement { refs, capabilities }
    }

    /// Read a protocol v0 reference advertisement up to and including its flush packet.
    ///
    /// An `ERR` line of the remote ends reading with its message.
    pub fn read_from<R: Read>(input: &mut PacketLineIn<R>) -> Result<Self> {
        let mut out = Advertisement::default();
        let mut is_first = true;
        while let PacketLine::Data(raw) = input.read_packet()? {
            if let Some(err) = PacketLineRef::Data(raw.as_slice()).check_error() {
                let message = err.0.trim().to_str_lossy();
                return Err(Error::protocol(format!("remote error: {message}"), raw.as_slice()));
            }
            let mut line = raw.as_slice();
            line = line.strip_suffix(b"\n").unwrap_or(line);
            if std::mem::take(&mut is_first) {
                if let Some((head, caps)) = line.split_once_str(b"\0") {
                    out.capabilities = RemoteCapabilities::from_bytes(caps);
                    line = head;
                }
            }
            let (hex, name) = line
                .split_once_str(b" ")
                .ok_or_else(|| Error::protocol("malformed ref advertisement", raw.as_slice()))?;
            let id = ObjectId::from_hex(hex).map_err(|_| Error::protocol("malformed ref advertisement", raw.as_slice()))?;

            if name == b"capabilities^{}" {
                continue;
            }
            match name.strip_suffix(b"^{}") {
                Some(tag) => match out.refs.last_mut() {
                    Some(r) if r.name.as_slice() == tag => r.peeled_id = Some(id),
                    _ => return Err(Error::protocol("peeled ref does not follow its tag", raw.as_slice())),
                },
                None => out.refs.push(Ref::new(name, id)),
            }
        }
        Ok(out)
    }
}

/// What a fetch achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome<L> {
    /// `want` lines sent
    pub wants_sent: usize,
    /// `have` lines sent
    pub haves_sent: usize,
    /// Commits both sides have, sorted
    pub common: Vec<ObjectId>,
    /// The capabilities requested with the first want
    pub capabilities: Negotiated,
    /// Whether the remote was asked to include tags
    pub include_tags: bool,
    /// The lock on the received pack, `None` if nothing was fetched
    pub pack_lock: Option<L>,
}

/// A single fetch over a split duplex transport.
pub struct Session<'s, S, R, W> {
    store: &'s S,
    walker: Walker<'s, S>,
    input: PacketLineIn<R>,
    output: PacketLineOut<W>,
    options: FetchOptions,
    state: State,
    round: NegotiationRound,
}

impl<'s, S, R, W> Session<'s, S, R, W>
where
    S: ObjectStore,
    R: Read,
    W: Write,
{
    /// Prepare a fetch reading local history from `store` and talking to the remote through `input` and `output`.
    pub fn new(store: &'s S, input: R, output: W, options: FetchOptions) -> Self {
        Session {
            store,
            walker: Walker::new(store),
            input: PacketLineIn::new(input),
            output: PacketLineOut::new(output),
            options,
            state: State::Idle,
            round: NegotiationRound::default(),
        }
    }

    /// The current phase.
    pub fn state(&self) -> State {
        self.state
    }

    /// Fetch `wants` from the remote described by `advertisement`, using local refs and `haves` as starting points
    /// to find what both sides have in common, and hand the pack to `indexer`.
    ///
    /// Wants already present locally are not sent. If none are left, the remote
    /// is told so and no pack is received.
    pub fn fetch<I: PackIndexer + ?Sized>(
        mut self,
        advertisement: &Advertisement,
        wants: &[ObjectId],
        haves: &[ObjectId],
        indexer: &mut I,
        progress: &mut dyn ProgressSink,
    ) -> Result<FetchOutcome<I::Lock>> {
        let res = self.run(advertisement, wants, haves, indexer, progress);
        self.settle(&res);
        res
    }
}

impl<S, R, W> Session<'_, S, R, W>
where
    S: ObjectStore,
    R: Read,
    W: Write,
{
    fn run<I: PackIndexer + ?Sized>(
        &mut self,
        advertisement: &Advertisement,
        wants: &[ObjectId],
        haves: &[ObjectId],
        indexer: &mut I,
        progress: &mut dyn ProgressSink,
    ) -> Result<FetchOutcome<I::Lock>> {
        self.transition(State::Advertising);
        for r in &advertisement.refs {
            self.walker.mark_advertised(r);
        }
        let max_time = self.walker.max_time_wanted(wants);
        let local_refs = self.store.local_refs();
        self.walker.mark_reachable(&local_refs, haves, max_time);

        self.transition(State::SendingWants);
        let negotiated = capabilities::negotiate(&self.options, &advertisement.capabilities);
        let wants_sent = self.send_wants(wants, &negotiated)?;
        if wants_sent == 0 {
            self.transition(State::Done);
            tracing::info!("nothing to fetch, all wanted objects are present locally");
            return Ok(FetchOutcome {
                wants_sent,
                haves_sent: 0,
                common: Vec::new(),
                capabilities: Negotiated::default(),
                include_tags: false,
                pack_lock: None,
            });
        }

        self.round.multi_ack = negotiated.multi_ack;
        self.transition(State::Negotiating);
        self.send_haves(progress)?;
        self.transition(State::Draining);
        self.drain(progress)?;

        self.transition(State::ReceivingPack);
        let options = IndexOptions {
            fix_thin: negotiated.thin_pack,
            check_objects: self.options.check_objects,
            lock_message: self.options.lock_message.clone(),
        };
        let lock = pack::receive(&mut self.input, negotiated.side_band, indexer, &options, progress)?;
        self.transition(State::Done);

        let outcome = FetchOutcome {
            wants_sent,
            haves_sent: self.round.haves_sent,
            common: self.walker.common_commits(),
            include_tags: negotiated.include_tag,
            capabilities: negotiated,
            pack_lock: Some(lock),
        };
        tracing::info!(
            wants = outcome.wants_sent,
            haves = outcome.haves_sent,
            common = outcome.common.len(),
            "fetch complete"
        );
        Ok(outcome)
    }

    /// Write a want line for each object not known locally, the first one with `negotiated` capabilities.
    ///
    /// The flush packet is written even if there was nothing to want.
    fn send_wants(&mut self, wants: &[ObjectId], negotiated: &Negotiated) -> Result<usize> {
        let mut sent = 0;
        for id in wants {
            if self.walker.is_reachable(id) {
                tracing::debug!(%id, "not wanting object that is reachable locally");
                continue;
            }
            let suffix = if sent == 0 { negotiated.want_suffix.as_str() } else { "" };
            self.output.write_line(&format!("{}{id}{suffix}\n", protocol::WANT))?;
            sent += 1;
        }
        self.output.end()?;
        tracing::debug!(wants = sent, capabilities = %negotiated.want_suffix.trim_start(), "sent wants");
        Ok(sent)
    }

    fn send_haves(&mut self, progress: &mut dyn ProgressSink) -> Result<()> {
        self.walker.begin_negotiation();
        while let Some(id) = self.walker.next_have() {
            self.output.write_line(&format!("{}{id}\n", protocol::HAVE))?;
            tracing::trace!(%id, "have");
            self.round.haves_sent += 1;
            self.round.haves_since_continue += 1;

            if self.round.haves_sent % protocol::HAVES_PER_ROUND != 0 {
                continue;
            }
            progress.check()?;
            self.output.end()?;
            self.round.pending += 1;
            tracing::debug!(haves = self.round.haves_sent, pending = self.round.pending, "flushed have batch");

            // Stay a batch ahead of the remote.
            if self.round.haves_sent == protocol::HAVES_PER_ROUND {
                continue;
            }

            if self.read_batch_response(progress)? {
                return Ok(());
            }
            if self.round.haves_since_continue >= protocol::MAX_IN_VAIN {
                tracing::debug!(
                    in_vain = self.round.haves_since_continue,
                    "giving up on finding more common commits"
                );
                break;
            }
        }
        Ok(())
    }

    /// Read acknowledgements up to the `NAK` ending the oldest pending batch.
    ///
    /// Return `true` if the remote sent a plain `ACK`, which ends negotiation.
    fn read_batch_response(&mut self, progress: &mut dyn ProgressSink) -> Result<bool> {
        loop {
            let (ack, id) = self.input.read_ack()?;
            tracing::debug!(?ack, ?id, "negotiation response");
            match ack {
                AckNak::Nak => {
                    self.round.pending = self.round.pending.saturating_sub(1);
                    return Ok(false);
                }
                AckNak::Ack => {
                    self.round.multi_ack = MultiAckMode::Off;
                    self.round.pending = 0;
                    self.round.received_ack = true;
                    return Ok(true);
                }
                AckNak::Continue | AckNak::Common | AckNak::Ready => {
                    if let Some(id) = id {
                        self.walker.mark_common(&id);
                    }
                    self.round.received_ack = true;
                    self.round.received_continue = true;
                    self.round.haves_since_continue = 0;
                }
            }
            progress.check()?;
        }
    }

    /// Send `done` and consume every acknowledgement still owed by the remote.
    fn drain(&mut self, progress: &mut dyn ProgressSink) -> Result<()> {
        progress.check()?;
        self.output.write_line(protocol::DONE)?;
        self.output.flush()?;

        if !self.round.received_ack {
            // The remote answers `done` with one more response.
            self.round.multi_ack = MultiAckMode::Off;
            self.round.pending += 1;
        }
        tracing::debug!(pending = self.round.pending, multi_ack = ?self.round.multi_ack, "sent done");

        while self.round.pending > 0 || self.round.multi_ack != MultiAckMode::Off {
            let (ack, id) = self.input.read_ack()?;
            self.round.pending = self.round.pending.saturating_sub(1);
            tracing::debug!(?ack, ?id, "final response");
            match ack {
                AckNak::Nak => {}
                AckNak::Ack => break,
                AckNak::Continue | AckNak::Common | AckNak::Ready => {
                    self.round.multi_ack = MultiAckMode::Continue;
                    if let Some(id) = id {
                        self.walker.mark_common(&id);
                    }
                }
            }
            progress.check()?;
        }
        Ok(())
    }

    fn settle<T>(&mut self, res: &Result<T>) {
        match res {
            Ok(_) => {}
            Err(err) if err.is_cancelled() => {
                tracing::debug!(state = ?self.state, "fetch cancelled");
                self.transition(State::Cancelled);
            }
            Err(err) => {
                tracing::debug!(state = ?self.state, %err, "fetch failed");
                self.transition(State::Failed);
            }
        }
    }

    fn transition(&mut self, next: State) {
        tracing::debug!(from = ?self.state, to = ?next, "fetch state");
        self.state = next;
    }
}
