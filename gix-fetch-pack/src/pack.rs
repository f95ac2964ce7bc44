//! Handing the received pack to an indexer
//!
//! Once negotiation is over, everything the remote sends is the pack, either
//! raw or multiplexed with progress on the side-band. The indexer consumes it
//! and returns a lock keeping the new pack alive until refs point into it.

use std::{
    cell::RefCell,
    io::{self, Read},
};

use crate::{
    error::{BoxedError, Error, Result},
    packetline::{sideband::from_io, PacketLineIn},
    progress::ProgressSink,
    types::SideBandMode,
};

/// How the received pack is to be indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Complete a thin pack with delta bases from the local object database
    pub fix_thin: bool,
    /// Validate every object
    pub check_objects: bool,
    /// Describes why the resulting pack is locked
    pub lock_message: Option<String>,
}

/// Turns a pack stream into a pack stored locally.
pub trait PackIndexer {
    /// Keeps the new pack from being garbage collected while held.
    type Lock;

    /// Consume `pack` until its end and store it.
    ///
    /// `progress` receives indexing progress and is to be polled for cancellation.
    fn index(
        &mut self,
        pack: &mut dyn Read,
        options: &IndexOptions,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<Self::Lock, BoxedError>;
}

impl<T: PackIndexer + ?Sized> PackIndexer for &mut T {
    type Lock = T::Lock;

    fn index(
        &mut self,
        pack: &mut dyn Read,
        options: &IndexOptions,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<Self::Lock, BoxedError> {
        (**self).index(pack, options, progress)
    }
}

/// Read the pack following negotiation from `input` and pass it to `indexer`.
///
/// With `side_band` enabled, progress of the remote and of the indexer both go to `progress`.
pub fn receive<R: Read, I: PackIndexer + ?Sized>(
    input: &mut PacketLineIn<R>,
    side_band: SideBandMode,
    indexer: &mut I,
    options: &IndexOptions,
    progress: &mut dyn ProgressSink,
) -> Result<I::Lock> {
    tracing::debug!(?side_band, fix_thin = options.fix_thin, "receiving pack");
    if side_band.is_enabled() {
        let shared = RefCell::new(progress);
        let mut remote = Shared(&shared);
        let mut local = Shared(&shared);
        let mut bands = input.sideband(&mut remote);
        let res = indexer.index(&mut bands.as_read(), options, &mut local);
        res.map_err(|err| match err.downcast::<io::Error>() {
            Ok(err) => bands.error(*err),
            Err(err) => from_indexer(err),
        })
    } else {
        indexer.index(input.inner_mut(), options, progress).map_err(from_indexer)
    }
}

/// A progress sink usable by both, the side-band reader and the indexer reading from it.
struct Shared<'a, 'p>(&'a RefCell<&'p mut dyn ProgressSink>);

impl ProgressSink for Shared<'_, '_> {
    fn report(&mut self, message: &str) {
        if let Ok(mut progress) = self.0.try_borrow_mut() {
            progress.report(message);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.0.try_borrow().map_or(false, |progress| progress.is_cancelled())
    }
}

/// Recover errors of our own making that travelled through the indexer.
fn from_indexer(err: BoxedError) -> Error {
    let err = match err.downcast::<Error>() {
        Ok(err) => return *err,
        Err(err) => err,
    };
    match err.downcast::<io::Error>() {
        Ok(err) => from_io(*err),
        Err(other) => Error::Index(other),
    }
}

/// The lock returned by [`InMemoryIndexer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryLock {
    /// The message the lock was created with
    pub message: Option<String>,
    /// The size of the received pack in bytes
    pub len: usize,
}

/// An indexer keeping the received pack bytes in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIndexer {
    /// The bytes of all packs received so far
    pub received: Vec<u8>,
    /// The options passed with the last pack
    pub options: Option<IndexOptions>,
}

impl PackIndexer for InMemoryIndexer {
    type Lock = InMemoryLock;

    fn index(
        &mut self,
        pack: &mut dyn Read,
        options: &IndexOptions,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<Self::Lock, BoxedError> {
        let start = self.received.len();
        pack.read_to_end(&mut self.received)?;
        if progress.is_cancelled() {
            return Err(Error::Cancelled.into());
        }
        self.options = Some(options.clone());
        Ok(InMemoryLock {
            message: options.lock_message.clone(),
            len: self.received.len() - start,
        })
    }
}
