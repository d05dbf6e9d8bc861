pub mod error;
pub mod ids;
pub mod local;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::UserId;
pub use local::FileSessionStore;
pub use types::{SESSION_STATE_KEY, SessionRecord};

/// Persisted identity of the logged-in user.
///
/// The stored record is trusted as-is until `clear` is called; no staleness checks.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> StorageResult<Option<SessionRecord>>;
    fn save(&self, record: &SessionRecord) -> StorageResult<()>;
    fn clear(&self) -> StorageResult<()>;
}
