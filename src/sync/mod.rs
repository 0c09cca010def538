pub mod priority_lock;

pub use priority_lock::{PriorityLock, PriorityLockGuard};
