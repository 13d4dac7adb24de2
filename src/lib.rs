//! Daily attendance reconciliation and retention purging over a record store.
//!
//! Two one-shot jobs share a cursor-paginated full scan:
//! - [`reconcile::Reconciler`] marks roster members with no report for a day
//! - [`retention::RetentionPurger`] deletes records older than a window

pub mod config;
pub mod models;
#[cfg(feature = "cli")]
pub mod observability;
pub mod reconcile;
pub mod retention;
pub mod scan;
pub mod store;

#[cfg(test)]
mod tests;
