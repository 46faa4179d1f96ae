//! User-supplied key kept in the local store.

use super::store::{LocalStore, CREDENTIAL_SLOT};
use super::{Credential, CredentialSource};
use crate::error::{EditError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A blocking "paste your API key" dialog.
///
/// Always invoked from a blocking-pool thread, never on an async worker.
pub trait KeyPrompt: Send + Sync {
    /// Asks the user for a key. `Ok(None)` means the user cancelled.
    fn prompt_for_key(&self) -> std::io::Result<Option<String>>;
}

/// Prompts for a key once, then reuses it from the [`LocalStore`] until the
/// upstream rejects it.
pub struct PersistedCredential {
    store: LocalStore,
    prompt: Arc<dyn KeyPrompt>,
}

impl PersistedCredential {
    /// Creates a source over the given store and prompt.
    pub fn new(store: LocalStore, prompt: impl KeyPrompt + 'static) -> Self {
        Self {
            store,
            prompt: Arc::new(prompt),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Stores a key directly, replacing any previous one.
    pub fn remember(&self, key: &str) -> Result<Credential> {
        remember(&self.store, key)
    }

    /// Forgets the stored key.
    pub fn forget(&self) -> Result<bool> {
        self.store.remove(CREDENTIAL_SLOT)
    }

    /// Returns the stored key without prompting.
    pub fn stored(&self) -> Result<Option<Credential>> {
        stored(&self.store)
    }
}

fn remember(store: &LocalStore, key: &str) -> Result<Credential> {
    let credential = Credential::new(key)?;
    store.set(CREDENTIAL_SLOT, credential.expose())?;
    Ok(credential)
}

fn stored(store: &LocalStore) -> Result<Option<Credential>> {
    Ok(store
        .get(CREDENTIAL_SLOT)?
        .and_then(|key| Credential::new(key).ok()))
}

/// Stored key if readable, otherwise ask. A corrupt store is cleared first.
fn provision(store: &LocalStore, prompt: &dyn KeyPrompt) -> Result<Credential> {
    match stored(store) {
        Ok(Some(credential)) => return Ok(credential),
        Ok(None) => {}
        Err(e @ EditError::CorruptStore { .. }) => {
            tracing::warn!("{e}; asking for a new API key");
            store.remove(CREDENTIAL_SLOT)?;
        }
        Err(e) => return Err(e),
    }

    match prompt.prompt_for_key()? {
        Some(key) if !key.trim().is_empty() => {
            let credential = remember(store, &key)?;
            tracing::debug!(path = %store.path().display(), "stored API key");
            Ok(credential)
        }
        _ => Err(EditError::MissingCredential),
    }
}

#[async_trait]
impl CredentialSource for PersistedCredential {
    async fn credential(&self) -> Result<Credential> {
        let store = self.store.clone();
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || provision(&store, prompt.as_ref()))
            .await
            .map_err(|e| EditError::Config(format!("API key prompt task failed: {e}")))?
    }

    async fn invalidate(&self) {
        let store = self.store.clone();
        let cleared = tokio::task::spawn_blocking(move || store.remove(CREDENTIAL_SLOT)).await;
        match cleared {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("failed to clear stored API key: {e}"),
            Err(e) => tracing::warn!("failed to clear stored API key: {e}"),
        }
    }

    fn describe(&self) -> &'static str {
        "stored key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::ThreadId;

    struct ScriptedPrompt {
        answer: Option<&'static str>,
        calls: Arc<AtomicUsize>,
        thread: Arc<Mutex<Option<ThreadId>>>,
    }

    impl KeyPrompt for ScriptedPrompt {
        fn prompt_for_key(&self) -> std::io::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.thread.lock().unwrap() = Some(std::thread::current().id());
            Ok(self.answer.map(String::from))
        }
    }

    fn make_source(
        dir: &tempfile::TempDir,
        answer: Option<&'static str>,
    ) -> (PersistedCredential, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let prompt = ScriptedPrompt {
            answer,
            calls: Arc::clone(&calls),
            thread: Arc::default(),
        };
        let store = LocalStore::at(dir.path().join("storage.json"));
        (PersistedCredential::new(store, prompt), calls)
    }

    #[tokio::test]
    async fn test_prompts_once_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let (source, calls) = make_source(&dir, Some("  pasted-key\n"));

        assert_eq!(source.credential().await.unwrap().expose(), "pasted-key");
        assert_eq!(source.credential().await.unwrap().expose(), "pasted-key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.store().get(CREDENTIAL_SLOT).unwrap().as_deref(),
            Some("pasted-key")
        );
    }

    #[tokio::test]
    async fn test_invalidate_clears_and_reprompts() {
        let dir = tempfile::tempdir().unwrap();
        let (source, calls) = make_source(&dir, Some("new-key"));
        source.remember("old-key").unwrap();

        assert_eq!(source.credential().await.unwrap().expose(), "old-key");
        source.invalidate().await;
        assert_eq!(source.store().get(CREDENTIAL_SLOT).unwrap(), None);

        assert_eq!(source.credential().await.unwrap().expose(), "new-key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_prompt_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (source, _) = make_source(&dir, None);
        assert!(matches!(
            source.credential().await,
            Err(EditError::MissingCredential)
        ));

        let (source, _) = make_source(&dir, Some("   "));
        assert!(matches!(
            source.credential().await,
            Err(EditError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_prompt_runs_off_the_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let thread = Arc::new(Mutex::new(None));
        let prompt = ScriptedPrompt {
            answer: Some("pasted-key"),
            calls: Arc::new(AtomicUsize::new(0)),
            thread: Arc::clone(&thread),
        };
        let source =
            PersistedCredential::new(LocalStore::at(dir.path().join("storage.json")), prompt);

        assert_eq!(source.credential().await.unwrap().expose(), "pasted-key");
        let prompted_on = thread.lock().unwrap().expect("prompt was not called");
        assert_ne!(prompted_on, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_cleared_and_reprompted() {
        let dir = tempfile::tempdir().unwrap();
        let (source, calls) = make_source(&dir, Some("new-key"));
        std::fs::write(source.store().path(), r#"{"gemini-api-key": "abc"#).unwrap();

        assert_eq!(source.credential().await.unwrap().expose(), "new-key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.store().get(CREDENTIAL_SLOT).unwrap().as_deref(),
            Some("new-key")
        );
    }

    #[tokio::test]
    async fn test_invalidate_clears_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let (source, calls) = make_source(&dir, Some("new-key"));
        std::fs::write(source.store().path(), "{truncated").unwrap();

        source.invalidate().await;
        assert!(!source.store().path().exists());
        assert_eq!(source.credential().await.unwrap().expose(), "new-key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
