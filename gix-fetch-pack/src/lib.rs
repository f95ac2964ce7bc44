//! Client-side fetch negotiation for gitoxide
//!
//! This crate implements the part of a git fetch that happens between reading
//! the remote's reference advertisement and storing the received pack: deciding
//! which objects to want, finding commits both sides have in common through
//! `have`/`ACK` rounds, and handing the pack stream to an indexer.
//!
//! # Features
//!
//! - pkt-line framing with side-band demultiplexing
//! - `multi_ack` and `multi_ack_detailed` negotiation
//! - Capability selection as a pure function of options and what the remote offers
//! - Cooperative cancellation through the progress sink
//!
//! The object database and the pack indexer are collaborators provided by the
//! caller through [`ObjectStore`] and [`PackIndexer`].
//!
//! # Example Usage
//!
//! ```no_run
//! use gix_fetch_pack::{pack::InMemoryIndexer, progress::Log, store::InMemoryStore, Advertisement, FetchOptions, Session};
//! use std::io::{stdin, stdout};
//!
//! let store = InMemoryStore::new();
//! let mut input = gix_fetch_pack::packetline::PacketLineIn::new(stdin());
//! let advertisement = Advertisement::read_from(&mut input)?;
//! let wants: Vec<_> = advertisement.refs.iter().map(|r| r.object_id).collect();
//!
//! let session = Session::new(&store, input.into_inner(), stdout(), FetchOptions::default());
//! let outcome = session.fetch(&advertisement, &wants, &[], &mut InMemoryIndexer::default(), &mut Log)?;
//! println!("{} haves sent", outcome.haves_sent);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod capabilities;
pub mod config;
pub mod error;
pub mod fetch;
pub mod interrupt;
pub mod pack;
pub mod packetline;
pub mod progress;
pub mod store;
mod types;
pub mod walk;

pub use config::FetchOptions;
pub use error::{Error, Result};
pub use fetch::{Advertisement, FetchOutcome, Session, State};
pub use pack::PackIndexer;
pub use progress::ProgressSink;
pub use store::ObjectStore;
pub use types::*;

/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
