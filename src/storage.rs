use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use crate::entities::{Post, Tag};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbOperation {
    CreateTag { tag: Tag },
    CreatePost { post: Post },
}

/// Append-only log of store mutations, replayed on open.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_all(&self) -> Result<Vec<DbOperation>, StoreError>;
    async fn write(&mut self, operation: DbOperation) -> Result<(), StoreError>;
    async fn close(&mut self) -> Result<(), StoreError>;
}

pub struct FileStorage {
    db_path: PathBuf,
    file: File,
}

impl FileStorage {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&db_path)
            .await
            .map_err(StoreError::DbIOError)?;
        Ok(Self { db_path, file })
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, StoreError> {
        let file_str = tokio::fs::read_to_string(&self.db_path).await
            .map_err(StoreError::DbIOError)?;
        let operations = file_str.split('\n')
            .filter(|x| !x.is_empty())
            .map(|x| serde_json::from_str(x).map_err(StoreError::DbSerializationError))
            .collect::<Result<Vec<DbOperation>, StoreError>>()?;
        Ok(operations)
    }

    async fn write(&mut self, operation: DbOperation) -> Result<(), StoreError> {
        let serialized_operation = serde_json::to_string(&operation)
            .map_err(StoreError::DbSerializationError)?;
        let line = format!("{}\n", serialized_operation);
        self.file.write_all(line.as_bytes()).await
            .map_err(StoreError::DbIOError)?;
        self.file.flush().await
            .map_err(StoreError::DbIOError)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.file.flush().await.map_err(StoreError::DbIOError)?;
        self.file.sync_all().await.map_err(StoreError::DbIOError)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    operations: Vec<DbOperation>,
}

impl InMemoryStorage {
    pub fn with_operations(operations: Vec<DbOperation>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn read_all(&self) -> Result<Vec<DbOperation>, StoreError> {
        Ok(self.operations.clone())
    }

    async fn write(&mut self, operation: DbOperation) -> Result<(), StoreError> {
        self.operations.push(operation);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Post, Tag, TagId};

    #[tokio::test]
    async fn file_storage_appends_and_replays_operations() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("blogpost.db.jsonl");

        let tag = Tag { id: TagId::new(), name: "rust".to_string() };
        let post = Post::new("T".to_string(), "D".to_string(), "aGk=".to_string(), vec![tag.id]);

        let mut storage = FileStorage::open(&db_path).await.unwrap();
        storage.write(DbOperation::CreateTag { tag: tag.clone() }).await.unwrap();
        storage.write(DbOperation::CreatePost { post: post.clone() }).await.unwrap();
        storage.close().await.unwrap();

        let reopened = FileStorage::open(&db_path).await.unwrap();
        let operations = reopened.read_all().await.unwrap();
        assert_eq!(operations, vec![
            DbOperation::CreateTag { tag },
            DbOperation::CreatePost { post },
        ]);
    }

    #[tokio::test]
    async fn file_storage_rejects_corrupted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("blogpost.db.jsonl");
        std::fs::write(&db_path, "{\"CreateTag\":\n").unwrap();

        let storage = FileStorage::open(&db_path).await.unwrap();
        let result = storage.read_all().await;
        assert!(matches!(result, Err(StoreError::DbSerializationError(_))));
    }
}
