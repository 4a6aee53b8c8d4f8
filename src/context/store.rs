//! Durable storage for the conversation document

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::ConversationContext;
use crate::{Error, Result};

/// Where the conversation document lives
pub trait ContextBackend: Send + Sync {
    /// Read the raw document; `Ok(None)` if nothing has been stored yet
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be read
    fn read(&self) -> Result<Option<String>>;

    /// Replace the whole document
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be written
    fn write(&self, document: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// JSON document on the local filesystem
///
/// Writes go through a temporary file in the same directory and are renamed
/// into place, so a crash mid-write never leaves a truncated document.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, document: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(document.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Context(format!("failed to replace {}: {e}", self.path.display())))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

/// Process-local storage, used when no durable path is wanted
#[derive(Default)]
pub struct MemoryBackend {
    document: Mutex<Option<String>>,
}

impl MemoryBackend {
    /// Seed the backend with an existing document
    #[must_use]
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(document.into())),
        }
    }
}

impl ContextBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>> {
        self.document
            .lock()
            .map(|doc| doc.clone())
            .map_err(|_| Error::Context("memory backend lock poisoned".to_string()))
    }

    fn write(&self, document: &str) -> Result<()> {
        let mut doc = self
            .document
            .lock()
            .map_err(|_| Error::Context("memory backend lock poisoned".to_string()))?;
        *doc = Some(document.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Loads and saves the conversation document through a backend
pub struct ContextStore {
    backend: Box<dyn ContextBackend>,
}

impl ContextStore {
    #[must_use]
    pub fn new(backend: Box<dyn ContextBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by a JSON file
    #[must_use]
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonFileBackend::new(path)))
    }

    /// Store kept in memory only
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::default()))
    }

    /// Load the document
    ///
    /// A missing, unreadable or corrupt document yields an empty context; the
    /// caller never sees an error.
    #[must_use]
    pub fn load(&self) -> ConversationContext {
        let raw = match self.backend.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(backend = self.backend.name(), "no stored context, starting fresh");
                return ConversationContext::default();
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "failed to read context, starting fresh");
                return ConversationContext::default();
            }
        };

        match serde_json::from_str::<ConversationContext>(&raw) {
            Ok(mut context) => {
                context.truncate_history();
                tracing::debug!(
                    backend = self.backend.name(),
                    turns = context.history.len(),
                    topics = context.topics.len(),
                    "loaded context"
                );
                context
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "corrupt context document, reinitializing");
                ConversationContext::default()
            }
        }
    }

    /// Overwrite the stored document
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the backend write fails
    pub fn save(&self, context: &ConversationContext) -> Result<()> {
        let document = serde_json::to_string_pretty(context)?;
        self.backend.write(&document)?;
        tracing::debug!(backend = self.backend.name(), "saved context");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConversationTurn;

    fn sample_context() -> ConversationContext {
        let mut ctx = ConversationContext::default();
        ctx.driver_details.name = "Ravi".to_string();
        ctx.driver_details
            .family
            .insert("daughter".to_string(), "starts school next week".to_string());
        ctx.remember_topic("cricket", "follows the test series");
        ctx.push_turn(ConversationTurn::user("i'm okay"));
        ctx.push_turn(ConversationTurn::system("what's the score?"));
        ctx
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::json_file(dir.path().join("context.json"));
        assert_eq!(store.load(), ConversationContext::default());
    }

    #[test]
    fn corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ContextStore::json_file(&path);
        assert_eq!(store.load(), ConversationContext::default());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::json_file(dir.path().join("nested").join("context.json"));
        let ctx = sample_context();

        store.save(&ctx).unwrap();
        assert_eq!(store.load(), ctx);
    }

    #[test]
    fn saving_a_fresh_load_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        let store = ContextStore::json_file(&path);
        store.save(&sample_context()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        store.save(&store.load()).unwrap();
        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let store = ContextStore::new(Box::new(MemoryBackend::with_document(
            r#"{"driver_details": {"name": "Mei"}}"#,
        )));
        let ctx = store.load();
        assert_eq!(ctx.driver_details.name, "Mei");
        assert!(ctx.history.is_empty());
        assert!(ctx.topics.is_empty());
    }

    #[test]
    fn oversized_history_is_truncated_on_load() {
        let mut ctx = ConversationContext::default();
        ctx.history = (0..5).map(|i| ConversationTurn::user(format!("turn {i}"))).collect();
        let store = ContextStore::new(Box::new(MemoryBackend::with_document(
            serde_json::to_string(&ctx).unwrap(),
        )));

        let loaded = store.load();
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[1].content, "turn 4");
    }
}
