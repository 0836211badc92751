mod flock;
mod handle;
mod manager;
mod mysql;
mod path;

pub use flock::FlockManager;
pub use handle::Handle;
pub use manager::{
    create_handle, fail_if_ttl_exceeded, CallSiteKey, FixedKey, KeyStrategy, LockManager,
    RetryPolicy, TypeNameKey,
};
pub use mysql::{MySqlLockManager, ENDLESS, MAX_KEY_LEN};
pub use path::{default_lock_dir, ensure_lock_dir, is_linked_at, lock_file_name};
