//! User-space enrichment and top-K reporting layer for a kernel TCP
//! traffic tracer.
//!
//! Two subsystems do the real work: a refcounted uid/gid -> name
//! [`resolver`] shared by all active consumers, and a periodic [`top`]
//! sampler that snapshots a live per-connection counter table, sorts it
//! by a multi-column key, truncates to the top N rows, and emits one
//! JSON event per tick through the [`sink`].

pub mod agent;
pub mod config;
pub mod resolver;
pub mod sink;
pub mod top;
pub mod tracer;
