//! Table store adapters.
//!
//! - `MemoryTableStore`: process memory, for development and tests.
//! - `DieselTableStore`: PostgreSQL via `diesel-async` and `bb8`, one
//!   `entities` table holding every logical table.
//! - `RetryingTableStore`: timeout and transient-retry decorator wrapped
//!   around either.
//!
//! The PostgreSQL notification queue shares the pool and lives here too.
//! Diesel row structs (`models.rs`) and schema definitions (`schema.rs`)
//! never leave this module.

mod diesel_notification_queue;
mod diesel_table_store;
mod memory_table_store;
mod migrations;
mod models;
mod pool;
mod retrying_table_store;
mod schema;

pub use diesel_notification_queue::DieselNotificationQueue;
pub use diesel_table_store::DieselTableStore;
pub use memory_table_store::MemoryTableStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
pub use retrying_table_store::{RetryPolicy, RetryingTableStore, StoreSleeper, TokioSleeper};
