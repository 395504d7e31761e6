//! moosync: offline-first data synchronization for the Moo Insights farm
//! and shop manager.
//!
//! This crate is the data layer a client UI sits on top of: a durable local
//! cache of every entity table, a pending-mutation queue for changes made
//! while offline, a connectivity monitor that triggers reconciliation on
//! reconnect, per-entity data accessors with optimistic writes, and a
//! transport-level caching gateway for the application shell and remote data
//! responses.
//!
//! The design position throughout is that losing connectivity is a normal
//! mode, not an error: reads degrade to the cache, writes queue for replay,
//! and the user hears about it through notices rather than failures.

pub mod accessor;
pub mod config;
pub mod connectivity;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod notice;
pub mod remote;
pub mod store;
pub mod sync;
