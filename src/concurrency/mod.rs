pub mod lock_manager;
pub mod transaction;


pub use lock_manager::{LockManager, LockMode};
pub use transaction::{Transaction, TransactionId};
