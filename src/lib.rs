//! Brezza is a compact personal blogging engine.
//!
//! The crate is organised in three layers. `domain` holds the post and
//! comment entities together with their invariants (visibility, comment
//! windows, slug derivation). `application` holds the engine proper: the
//! repository contracts, the caching decorator that answers every read from
//! an in-memory snapshot, pagination, and the content-transformation
//! pipeline. `infra` provides interchangeable persistence adapters
//! (flat-file JSON, PostgreSQL, in-memory) plus filesystem upload storage.
//!
//! HTTP routing, authentication, and view rendering are deliberately not
//! part of this crate; callers supply a privilege flag per read and wire
//! the adapters themselves.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
