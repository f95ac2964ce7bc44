//! Traversal of local history to find candidate haves
//!
//! The walker owns all per-commit state of a negotiation: a cache of loaded
//! commits and the [`Flags`] of every object it was told about. Commits are
//! visited newest first. Whenever a commit is visited its carried flags are
//! passed on to its parents, so markers placed on a commit reach ancestors that
//! aren't loaded yet once the traversal gets to them.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use gix_date::SecondsSinceUnixEpoch;
use gix_hash::{oid, ObjectId};

use crate::{
    store::ObjectStore,
    types::{CommitNode, Flags, Ref},
};

/// What to do with a commit popped from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    /// Return the commit to the caller.
    Produce,
    /// Continue with the next commit, but still traverse into parents.
    Skip,
    /// End the traversal, discarding everything still queued.
    Stop,
}

/// A commit-time ordered walk over local history, tracking negotiation state per commit.
pub struct Walker<'s, S> {
    store: &'s S,
    cache: HashMap<ObjectId, CommitNode>,
    flags: HashMap<ObjectId, Flags>,
    roots: Vec<ObjectId>,
    /// Newest commit first, ties broken by insertion order.
    queue: BinaryHeap<(SecondsSinceUnixEpoch, Reverse<u64>, ObjectId)>,
    seq: u64,
}

impl<'s, S: ObjectStore> Walker<'s, S> {
    /// Create a walker reading commits from `store`.
    pub fn new(store: &'s S) -> Self {
        Walker {
            store,
            cache: HashMap::new(),
            flags: HashMap::new(),
            roots: Vec::new(),
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Note that the remote has `r`, and the object it peels to.
    pub fn mark_advertised(&mut self, r: &Ref) {
        for id in std::iter::once(r.object_id).chain(r.peeled_id) {
            self.flags.entry(id).or_default().insert(Flags::ADVERTISED);
        }
    }

    /// Return the newest commit time among `wants`, or `0` if none of them is a local commit.
    pub fn max_time_wanted<'a>(&mut self, wants: impl IntoIterator<Item = &'a ObjectId>) -> SecondsSinceUnixEpoch {
        wants
            .into_iter()
            .filter_map(|id| self.find(id).map(|commit| commit.commit_time))
            .fold(0, SecondsSinceUnixEpoch::max)
    }

    /// Mark the tips of `local_refs` and all `haves` as reachable and use them as roots of all walks.
    ///
    /// With `max_time` above zero, local history is traversed down to that time, and every
    /// advertised commit found is marked common along with its ancestry and becomes a root too.
    pub fn mark_reachable(&mut self, local_refs: &[Ref], haves: &[ObjectId], max_time: SecondsSinceUnixEpoch) {
        let tips = local_refs.iter().map(|r| r.peeled_id.unwrap_or(r.object_id));
        for id in tips.chain(haves.iter().copied()) {
            if self.find(&id).is_none() {
                continue;
            }
            let flags = self.flags.entry(id).or_default();
            if !flags.contains(Flags::REACHABLE) {
                flags.insert(Flags::REACHABLE);
                self.roots.push(id);
            }
        }

        if max_time <= 0 {
            return;
        }
        self.restart(Flags::all());
        while let Some(id) = self.next_matching(|time, _| {
            if time < max_time {
                Decision::Stop
            } else {
                Decision::Produce
            }
        }) {
            let flags = self.flags.entry(id).or_default();
            if flags.contains(Flags::ADVERTISED) && !flags.contains(Flags::COMMON) {
                flags.insert(Flags::COMMON);
                self.carry(id, Flags::COMMON);
                self.roots.push(id);
            }
        }
        tracing::debug!(max_time, roots = self.roots.len(), "marked reachable history");
    }

    /// Prepare for producing haves, forgetting which commits are common.
    pub fn begin_negotiation(&mut self) {
        self.restart(Flags::REACHABLE | Flags::ADVERTISED);
    }

    /// Return the next commit to offer as have, newest first.
    ///
    /// Commits already known to be common are skipped. Advertised commits are
    /// returned once and become common, hiding their ancestry.
    pub fn next_have(&mut self) -> Option<ObjectId> {
        self.next_matching(|_, flags| {
            let remote_knows_it_is_common = flags.contains(Flags::COMMON);
            if flags.contains(Flags::ADVERTISED) {
                flags.insert(Flags::COMMON);
            }
            if remote_knows_it_is_common {
                Decision::Skip
            } else {
                Decision::Produce
            }
        })
    }

    /// Record that the remote has `id`, which implies it has all of its ancestors.
    pub fn mark_common(&mut self, id: &oid) {
        let id = id.to_owned();
        self.flags.entry(id).or_default().insert(Flags::COMMON);
        if self.find(&id).is_some() {
            self.carry(id, Flags::COMMON);
        }
    }

    /// Return `true` if `id` is known to be in local history.
    pub fn is_reachable(&self, id: &oid) -> bool {
        self.flags(id).contains(Flags::REACHABLE)
    }

    /// Return the flags of `id`, empty if it was never seen.
    pub fn flags(&self, id: &oid) -> Flags {
        self.flags.get(id).copied().unwrap_or_default()
    }

    /// Return all ids known to be common, sorted.
    pub fn common_commits(&self) -> Vec<ObjectId> {
        let mut out: Vec<_> = self
            .flags
            .iter()
            .filter(|(_, flags)| flags.contains(Flags::COMMON))
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }
}

/// Utilities
impl<S: ObjectStore> Walker<'_, S> {
    /// Load `id`, logging and skipping objects that aren't available as commits.
    fn find(&mut self, id: &oid) -> Option<&CommitNode> {
        if !self.cache.contains_key(id) {
            match self.store.find_commit(id) {
                Ok(commit) => {
                    self.cache.insert(id.to_owned(), commit);
                }
                Err(err) => {
                    tracing::debug!(%id, %err, "skipping object that can't be resolved to a commit");
                    return None;
                }
            }
        }
        self.cache.get(id)
    }

    /// Clear all flags not in `retain` along with the queue, and queue all roots.
    fn restart(&mut self, retain: Flags) {
        let retain = retain - Flags::SEEN;
        for flags in self.flags.values_mut() {
            *flags &= retain;
        }
        self.queue.clear();
        for root in self.roots.clone() {
            self.enqueue(root);
        }
    }

    fn enqueue(&mut self, id: ObjectId) {
        let flags = self.flags.entry(id).or_default();
        if flags.contains(Flags::SEEN) {
            return;
        }
        flags.insert(Flags::SEEN);
        let Some(time) = self.find(&id).map(|commit| commit.commit_time) else {
            return;
        };
        self.seq += 1;
        self.queue.push((time, Reverse(self.seq), id));
    }

    fn next_matching(&mut self, mut filter: impl FnMut(SecondsSinceUnixEpoch, &mut Flags) -> Decision) -> Option<ObjectId> {
        while let Some((time, _, id)) = self.queue.pop() {
            let decision = filter(time, self.flags.entry(id).or_default());
            if decision == Decision::Stop {
                self.queue.clear();
                return None;
            }

            let parents = self.cache.get(&id).map(|commit| commit.parents.clone()).unwrap_or_default();
            for parent in parents {
                self.enqueue(parent);
            }
            let carried = self.flags(&id) & Flags::CARRIED;
            if !carried.is_empty() {
                self.carry(id, carried);
            }

            if decision == Decision::Produce {
                return Some(id);
            }
        }
        None
    }

    /// Add `carried` to all ancestors of `from` that are loaded, and to the parents of the deepest loaded ones.
    fn carry(&mut self, from: ObjectId, carried: Flags) {
        let mut stack: Vec<ObjectId> = match self.cache.get(&from) {
            Some(commit) => commit.parents.to_vec(),
            None => return,
        };
        while let Some(id) = stack.pop() {
            let flags = self.flags.entry(id).or_default();
            if flags.contains(carried) {
                continue;
            }
            flags.insert(carried);
            if let Some(commit) = self.cache.get(&id) {
                stack.extend(commit.parents.iter().copied());
            }
        }
    }
}
