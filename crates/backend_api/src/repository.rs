use anyhow::{Context, Result};
use async_trait::async_trait;
use models::Transaction;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Persistence for the last qualifying transaction, so presence survives a
/// restart. Writes never move the stored transaction backwards in time.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn load(&self) -> Result<Option<Transaction>>;
    async fn save(&self, transaction: &Transaction) -> Result<()>;
}

/// Keeps the transaction in a single JSON file.
pub struct FileTransactionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTransactionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Option<Transaction>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Reading {}", self.path.display()))
            }
        };
        let transaction: Transaction = serde_json::from_str(&content)
            .with_context(|| format!("Parsing transaction JSON in {}", self.path.display()))?;
        Ok(Some(transaction))
    }
}

#[async_trait]
impl TransactionStore for FileTransactionStore {
    async fn load(&self) -> Result<Option<Transaction>> {
        self.read().await
    }

    async fn save(&self, transaction: &Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        // An unreadable file is replaced rather than blocking new evidence.
        if let Ok(Some(existing)) = self.read().await {
            if existing.created_at >= transaction.created_at {
                return Ok(());
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Creating {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(transaction)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// Process-lifetime store used when no file is configured.
#[derive(Default)]
pub struct MemoryTransactionStore {
    last: RwLock<Option<Transaction>>,
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn load(&self) -> Result<Option<Transaction>> {
        Ok(self.last.read().await.clone())
    }

    async fn save(&self, transaction: &Transaction) -> Result<()> {
        let mut last = self.last.write().await;
        let newer = last
            .as_ref()
            .map_or(true, |existing| transaction.created_at > existing.created_at);
        if newer {
            *last = Some(transaction.clone());
        }
        Ok(())
    }
}
