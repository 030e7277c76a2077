#![deny(missing_docs)]

//! This crate implements an in-memory, order-preserving B-tree index.
//!
//! Unlike a map, the index stores bare keys; a key type may carry payload
//! fields beyond its ordering field, and [`BTreeIndex::put`] returns a
//! reference to the stored key so such fields can be updated in place.
//!
//! Node layout is computed once per tree from the key size and a node byte
//! budget (see [`DEFAULT_NODE_SIZE`]), and all tree algorithms run without
//! recursion, so traversal depth is explicit and bounded.
//!
//! Most of the implementation is in the [tree] module, see [`tree::BTreeIndex`].
//!
//! # Example
//!
//! ```
//!     use btree_index::BTreeIndex;
//!     let mut ix = BTreeIndex::new().unwrap();
//!     ix.put(3u64).unwrap();
//!     ix.put(1).unwrap();
//!     ix.put(2).unwrap();
//!     let keys: Vec<u64> = ix.iter().copied().collect();
//!     assert_eq!(keys, [1, 2, 3]);
//! ```
//!
//!# Features
//!
//! This crate supports the following cargo features:
//! - `serde` : enables serialisation of [`BTreeIndex`] via serde crate.
//! - `unsafe-optim` : uses unsafe code for extra optimisation.

/// Module with the index implementation.
pub mod tree;

mod vecs;

pub use tree::{
    BTreeIndex, Comparator, Error, Iter, Layout, NaturalOrder, DEFAULT_NODE_SIZE, MAX_DEPTH,
};

// Tests.

/* mimalloc cannot be used with miri */
#[cfg(all(test, not(miri)))]
use mimalloc::MiMalloc;

#[cfg(all(test, not(miri)))]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[cfg(test)]
mod mytests;
