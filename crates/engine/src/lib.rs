//! Session engine for strata-session
//!
//! This crate ties the lower layers together:
//! - Database / DatabaseBuilder: backend, retry policy, strict mode, transactions
//! - Store / StoreConfig: a typed, named collection of records
//! - Session: exclusive in-memory owner of one record, synced in the background
//! - MigrationPipeline: ordered upgrades of stored records
//! - BadDataMonitor: migration, schema and decode checks with quarantine
//! - View: read-only historical access

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;
pub mod migration;
pub mod monitor;
pub mod session;
pub mod store;
mod sync;
pub mod view;

pub use config::{DefaultData, StoreConfig, DEFAULT_AUTOSAVE_DELAY};
pub use database::{Database, DatabaseBuilder};
pub use migration::{Migration, MigrationError, MigrationPipeline};
pub use monitor::{BadDataMonitor, Schema};
pub use session::{Session, SessionStatus};
pub use store::Store;
pub use view::View;
