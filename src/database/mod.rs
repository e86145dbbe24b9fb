//! # Database Operations
//!
//! Task persistence behind the [`TaskStore`] trait.
//!
//! - [`task_store`] - the store interface consumed by the reconciler
//! - [`memory_store`] - in-process store for embedding and tests
//! - [`pg_task_store`] - PostgreSQL store (feature `postgres`)

pub mod memory_store;
#[cfg(feature = "postgres")]
pub mod pg_task_store;
pub mod task_store;

pub use memory_store::InMemoryTaskStore;
#[cfg(feature = "postgres")]
pub use pg_task_store::PgTaskStore;
pub use task_store::TaskStore;
