//! # hyperchat-core
//!
//! Pure logic for the Hyperchat sync engine (no I/O, instant tests).
//!
//! This crate implements the cache, merge policy and state machines of the
//! engine without any network I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure**: they take input and produce output
//! without side effects.
//!
//! The actual I/O is performed by `hyperchat-client`, which interprets the
//! actions produced by these state machines and owns the single writer of the
//! [`EntityStore`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod optimistic;
pub mod state;
pub mod store;

pub use cursor::ChannelCursors;
pub use optimistic::{after_confirm, optimistic_patch, AfterConfirm};
pub use state::{BackoffPolicy, LinkAction, LinkEvent, LinkNotice, LinkState};
pub use store::{
    field_id, EntityStore, MergeOutcome, Record, Snapshot, StoreError, LAST_RECEIVED_MESSAGE,
    READ_RECEIPTS,
};
