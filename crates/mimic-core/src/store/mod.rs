pub mod crypto;
pub mod knowledge_store;
pub mod kv;

pub use crypto::{DeviceFingerprint, Envelope, EnvelopeCipher};
pub use knowledge_store::KnowledgeStore;
pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Storage substrate error: {0}")]
    Substrate(String),
}
