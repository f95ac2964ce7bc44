//! Access to the local object database as far as negotiation needs it

use std::collections::HashMap;

use gix_hash::{oid, ObjectId};

use crate::{
    error::BoxedError,
    types::{CommitNode, Ref},
};

/// The error returned by [`ObjectStore::find_commit()`].
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("object {id} does not exist")]
    NotFound { id: ObjectId },
    #[error("object {id} is not a commit")]
    NotACommit { id: ObjectId },
    #[error(transparent)]
    Other(#[from] BoxedError),
}

/// The local object database, read-only.
pub trait ObjectStore {
    /// Load the commit with `id`.
    fn find_commit(&self, id: &oid) -> Result<CommitNode, Error>;

    /// Return a snapshot of all local references, with their peeled targets if known.
    fn local_refs(&self) -> Vec<Ref>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn find_commit(&self, id: &oid) -> Result<CommitNode, Error> {
        (**self).find_commit(id)
    }

    fn local_refs(&self) -> Vec<Ref> {
        (**self).local_refs()
    }
}

/// A store holding commits and references in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    commits: HashMap<ObjectId, CommitNode>,
    other: Vec<ObjectId>,
    refs: Vec<Ref>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `commit`, replacing a previous commit with the same id.
    pub fn insert(&mut self, commit: CommitNode) -> &mut Self {
        self.commits.insert(commit.id, commit);
        self
    }

    /// Record the existence of a non-commit object like a blob or annotated tag.
    pub fn insert_other(&mut self, id: ObjectId) -> &mut Self {
        self.other.push(id);
        self
    }

    /// Add a local reference.
    pub fn add_ref(&mut self, r: Ref) -> &mut Self {
        self.refs.push(r);
        self
    }

    /// Return the amount of stored commits.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Return `true` if no commit is stored.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl ObjectStore for InMemoryStore {
    fn find_commit(&self, id: &oid) -> Result<CommitNode, Error> {
        match self.commits.get(id) {
            Some(commit) => Ok(commit.clone()),
            None if self.other.iter().any(|other| other.as_ref() == id) => Err(Error::NotACommit { id: id.to_owned() }),
            None => Err(Error::NotFound { id: id.to_owned() }),
        }
    }

    fn local_refs(&self) -> Vec<Ref> {
        self.refs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes_or_panic(&[byte; 20])
    }

    #[test]
    fn lookups_distinguish_missing_from_non_commits() {
        let mut store = InMemoryStore::new();
        store.insert(CommitNode::new(id(1), None, 10)).insert_other(id(2));
        assert_eq!(store.find_commit(&id(1)).unwrap().commit_time, 10);
        assert!(matches!(store.find_commit(&id(2)), Err(Error::NotACommit { .. })));
        assert!(matches!(store.find_commit(&id(3)), Err(Error::NotFound { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn refs_are_returned_as_snapshot() {
        let mut store = InMemoryStore::new();
        store.add_ref(Ref::new("refs/heads/main", id(1)));
        let snapshot = store.local_refs();
        store.add_ref(Ref::new("refs/heads/dev", id(2)));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.local_refs().len(), 2);
    }
}
