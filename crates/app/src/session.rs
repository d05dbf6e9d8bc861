use std::sync::Arc;

use smartchat_storage::{SessionRecord, SessionStore, StorageResult};

/// Identifies one login. Results of work started under an older generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionGeneration(pub u64);

/// Logged-in identity, passed to the shell instead of living in a global.
///
/// The record is read once by [`SessionContext::load`] and stays fixed until
/// [`SessionContext::clear`]. Every change of identity advances the generation.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    current: Option<SessionRecord>,
    generation: u64,
}

impl SessionContext {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            current: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> SessionGeneration {
        SessionGeneration(self.generation)
    }

    /// Reads the persisted record. An unreadable record counts as logged out.
    pub fn load(&mut self) -> Option<&SessionRecord> {
        self.current = match self.store.load() {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(error = %error, "ignoring unreadable session record");
                None
            }
        };
        self.generation += 1;
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&SessionRecord> {
        self.current.as_ref()
    }

    pub fn establish(&mut self, record: SessionRecord) -> StorageResult<&SessionRecord> {
        self.store.save(&record)?;
        tracing::info!(user_id = %record.id, username = %record.username, "session established");
        self.generation += 1;
        Ok(&*self.current.insert(record))
    }

    pub fn clear(&mut self) -> StorageResult<()> {
        self.current = None;
        self.generation += 1;
        self.store.clear()?;
        tracing::info!("session cleared");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use smartchat_storage::{SessionRecord, SessionStore, StorageResult};

    /// In-memory store that counts how often it was cleared.
    #[derive(Default)]
    pub(crate) struct MemorySessionStore {
        pub(crate) record: Mutex<Option<SessionRecord>>,
        pub(crate) clears: Mutex<usize>,
    }

    impl MemorySessionStore {
        pub(crate) fn holding(record: SessionRecord) -> Self {
            Self {
                record: Mutex::new(Some(record)),
                clears: Mutex::new(0),
            }
        }
    }

    impl SessionStore for MemorySessionStore {
        fn load(&self) -> StorageResult<Option<SessionRecord>> {
            Ok(self.record.lock().unwrap().clone())
        }

        fn save(&self, record: &SessionRecord) -> StorageResult<()> {
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }

        fn clear(&self) -> StorageResult<()> {
            *self.record.lock().unwrap() = None;
            *self.clears.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use smartchat_storage::{FileSessionStore, UserId};

    use super::testing::MemorySessionStore;
    use super::*;

    fn ada() -> SessionRecord {
        SessionRecord::new(UserId::parse("a").unwrap(), "ada").with_avatar("PHN2Zz4=")
    }

    #[test]
    fn load_reads_persisted_record_once() {
        let store = Arc::new(MemorySessionStore::holding(ada()));
        let mut session = SessionContext::new(store.clone());

        assert_eq!(session.load(), Some(&ada()));
        *store.record.lock().unwrap() = None;
        assert_eq!(session.current(), Some(&ada()));
    }

    #[test]
    fn clear_erases_store_and_current() {
        let store = Arc::new(MemorySessionStore::holding(ada()));
        let mut session = SessionContext::new(store.clone());
        session.load();

        session.clear().unwrap();

        assert_eq!(session.current(), None);
        assert_eq!(*store.clears.lock().unwrap(), 1);
        assert_eq!(session.load(), None);
    }

    #[test]
    fn identity_changes_advance_generation() {
        let store = Arc::new(MemorySessionStore::holding(ada()));
        let mut session = SessionContext::new(store);
        let initial = session.generation();

        session.load();
        let loaded = session.generation();
        session.clear().unwrap();
        let cleared = session.generation();
        session.establish(ada()).unwrap();

        assert!(initial < loaded);
        assert!(loaded < cleared);
        assert!(cleared < session.generation());
    }

    #[test]
    fn establish_persists_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = SessionContext::new(Arc::new(FileSessionStore::new(dir.path())));

        session.establish(ada()).unwrap();

        let mut reopened = SessionContext::new(Arc::new(FileSessionStore::new(dir.path())));
        assert_eq!(reopened.load(), Some(&ada()));
    }

    #[test]
    fn corrupt_record_counts_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), "{ broken").unwrap();

        let mut session = SessionContext::new(Arc::new(store));

        assert_eq!(session.load(), None);
    }
}
