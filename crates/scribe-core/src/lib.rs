//! # scribe-core
//!
//! Change capture and audit record building for scribe.
//!
//! This crate holds everything that does not touch a database connection:
//! - Field values and the column codecs that turn them into diff JSON
//! - Entity snapshots and the metadata registry that describes them
//! - The `ChangeSource` capability a host unit-of-work implements
//! - The per-transaction staging buffer, commit interceptor, and their scope
//! - The record builder, label resolver, and actor resolver
//!
//! The libSQL flusher that writes the built records lives in `scribe-db`.

pub mod auditor;
pub mod blame;
pub mod builder;
pub mod changes;
pub mod entity;
pub mod enums;
pub mod errors;
pub mod filter;
pub mod interceptor;
pub mod label;
pub mod metadata;
pub mod naming;
pub mod record;
pub mod scope;
pub mod staging;
pub mod tracker;
pub mod value;
