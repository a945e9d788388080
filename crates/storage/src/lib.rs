//! Exploit persistence: the `count` / `create_many` contract and its backends.

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::PersistenceError;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryExploitStore;
pub use postgres::PgExploitStore;
pub use store::ExploitStore;
