//! Shared foundational types used across the Folio document compiler.
//!
//! This crate provides content hashing and canonical document identifiers.

#![warn(missing_docs)]

pub mod doc_id;
pub mod hash;

pub use doc_id::DocId;
pub use hash::{ContentHash, ParseHashError};
