use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read/write DB file: {0}")]
    DbIOError(std::io::Error),
    #[error("Failed to serialize/deserialize DB operation: {0}")]
    DbSerializationError(serde_json::Error),
    #[error("Duplicate key: tag name '{0}' already exists")]
    DuplicateKey(String),
    #[error("Post {post_id} references unknown tag {tag_id}")]
    DanglingReference { post_id: String, tag_id: String },
}
