//! Encrypted persistence of learned behaviors.
//!
//! The whole collection is sealed into one envelope per save. Anything that
//! fails to decode on load counts as tampering: the entry is deleted and an
//! empty collection comes back.

use chrono::Utc;
use mimic_common::knowledge::{BehaviorPatch, KNOWLEDGE_SCHEMA_VERSION, KnowledgeRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::StoreError;
use super::crypto::{DeviceFingerprint, Envelope, EnvelopeCipher, derive_key, obfuscated_key_name};
use super::kv::KeyValueStore;
use crate::config::StoreConfig;

/// Used when no secret is configured. Offers no real confidentiality.
const BUILTIN_SECRET: &str = "mimic-shared-knowledge-secret";
const STORE_NAMESPACE: &str = "mimic.knowledge";
const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

pub struct KnowledgeStore {
    kv: Arc<dyn KeyValueStore>,
    cipher: EnvelopeCipher,
    key_name: String,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Open with the secret from `config.secret_env` (or the built-in one) and this machine's fingerprint.
    pub fn open(kv: Arc<dyn KeyValueStore>, config: &StoreConfig) -> Self {
        let secret = config
            .secret_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|s| !s.is_empty());
        let secret = match secret {
            Some(secret) => secret,
            None => {
                warn!("No store secret configured; using the built-in secret");
                BUILTIN_SECRET.to_string()
            }
        };
        Self::open_with(
            kv,
            &secret,
            &DeviceFingerprint::detect(config),
            config.iterations,
        )
    }

    pub fn open_with(
        kv: Arc<dyn KeyValueStore>,
        secret: &str,
        fingerprint: &DeviceFingerprint,
        iterations: u32,
    ) -> Self {
        let key = derive_key(secret, fingerprint, iterations);
        let key_name = obfuscated_key_name(STORE_NAMESPACE);
        debug!("Knowledge store opened (entry {})", key_name);
        Self {
            kv,
            cipher: EnvelopeCipher::new(&key),
            key_name,
            write_lock: Mutex::new(()),
        }
    }

    /// Drop the derived key.
    pub fn close(self) {
        debug!("Knowledge store closed");
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Never fails; unreadable data is destroyed and reported as empty.
    pub async fn load(&self) -> Vec<KnowledgeRecord> {
        let raw = match self.kv.get(&self.key_name).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Knowledge store unreadable: {}", e);
                return Vec::new();
            }
        };

        match self.decode(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!("Discarding knowledge store entry: {}", e);
                if let Err(e) = self.kv.remove(&self.key_name).await {
                    warn!("Failed to delete discarded entry: {}", e);
                }
                Vec::new()
            }
        }
    }

    fn decode(&self, raw: &str) -> Result<Vec<KnowledgeRecord>, StoreError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        if envelope.schema_version != KNOWLEDGE_SCHEMA_VERSION {
            return Err(StoreError::Crypto(format!(
                "unknown schema version {}",
                envelope.schema_version
            )));
        }
        let plaintext = self.cipher.open(&envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Re-encrypt and write the entire collection.
    pub async fn save(&self, records: &[KnowledgeRecord]) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(records)?;
        let envelope = self.cipher.seal(&plaintext, KNOWLEDGE_SCHEMA_VERSION)?;
        self.kv
            .set(&self.key_name, serde_json::to_string(&envelope)?)
            .await?;
        debug!("Saved {} behaviors", records.len());
        Ok(())
    }

    /// Insert a record, replacing any existing one with the same id.
    pub async fn add_behavior(&self, record: KnowledgeRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        info!("Storing behavior '{}' ({})", record.name, record.id);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save(&records).await
    }

    pub async fn update_behavior(
        &self,
        id: &str,
        patch: BehaviorPatch,
    ) -> Result<Option<KnowledgeRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.apply(patch);
        let updated = record.clone();
        self.save(&records).await?;
        Ok(Some(updated))
    }

    pub async fn get(&self, id: &str) -> Option<KnowledgeRecord> {
        self.load().await.into_iter().find(|r| r.id == id)
    }

    /// Behaviors whose name shares a word with `goal` or closely resembles it, most confident first.
    /// An empty goal matches everything.
    pub async fn find_matching(&self, goal: &str) -> Vec<KnowledgeRecord> {
        let goal = goal.trim().to_lowercase();
        let goal_tokens = tokens(&goal);

        let mut matches: Vec<KnowledgeRecord> = self
            .load()
            .await
            .into_iter()
            .filter(|r| goal.is_empty() || name_matches(&r.name, &goal, &goal_tokens))
            .collect();
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        matches
    }

    pub async fn remove_behavior(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records).await?;
        Ok(true)
    }

    /// Fold a replay outcome into a behavior's statistics.
    pub async fn record_execution(
        &self,
        id: &str,
        success: bool,
        duration_ms: u64,
        failure_reason: Option<String>,
    ) -> Result<Option<KnowledgeRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record
            .statistics
            .record(success, duration_ms as f64, failure_reason);
        record.last_tested = Some(Utc::now());
        let updated = record.clone();
        self.save(&records).await?;
        Ok(Some(updated))
    }

    pub async fn wipe(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        info!("Wiping knowledge store");
        self.kv.remove(&self.key_name).await
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn name_matches(name: &str, goal: &str, goal_tokens: &HashSet<String>) -> bool {
    let name = name.to_lowercase();
    !tokens(&name).is_disjoint(goal_tokens)
        || strsim::jaro_winkler(&name, goal) >= NAME_SIMILARITY_THRESHOLD
}
