//! Synchronization Primitives
//!
//! Safe synchronization and global state management for Rust 2024 edition.

pub mod condition;
pub mod once_lock;
pub mod sleeplock;

pub use condition::Condition;
pub use once_lock::{GlobalState, LazyLock, OnceLock};
pub use sleeplock::SleepLock;
