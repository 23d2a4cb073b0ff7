//! Agent identity, bearer-token, and audit-log storage.
//!
//! Tokens are hashed at rest with SHA-256 before indexing — the bearer
//! value a caller presents is never written to disk in plaintext, only its
//! digest, mirroring this lineage's existing secret-storage convention.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use cfgmesh_persist::{JsonStore, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum AuthStoreError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("agent {0} not found")]
    NotFound(Uuid),
}

pub type AuthStoreResult<T> = Result<T, AuthStoreError>;

/// One registered agent. `api_token_hash` is the only form of the bearer
/// token ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub agent_name: String,
    pub api_token_hash: String,
    pub poll_interval_seconds: Option<u64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_config_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hashes a bearer token for storage/comparison. Exposed so callers (the
/// controller's bearer-auth extractor) can hash an incoming token and
/// compare against `api_token_hash` without duplicating the algorithm.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-memory, snapshot-to-disk registry of agent identities, indexed both
/// by id and by token hash so bearer-auth lookups are O(1).
#[derive(Debug)]
pub struct AgentStore {
    store: JsonStore,
    agents: HashMap<Uuid, AgentRecord>,
    by_token_hash: HashMap<String, Uuid>,
}

impl AgentStore {
    pub async fn load(state_dir: impl AsRef<Path>) -> AuthStoreResult<Self> {
        let store = JsonStore::new(state_dir, "agents");
        let by_id: HashMap<String, AgentRecord> = store.load().await?;
        let agents: HashMap<Uuid, AgentRecord> = by_id
            .into_values()
            .map(|rec| (rec.id, rec))
            .collect();
        let by_token_hash = agents
            .values()
            .map(|rec| (rec.api_token_hash.clone(), rec.id))
            .collect();
        Ok(Self {
            store,
            agents,
            by_token_hash,
        })
    }

    async fn persist(&self) -> AuthStoreResult<()> {
        let by_id: HashMap<String, AgentRecord> = self
            .agents
            .iter()
            .map(|(id, rec)| (id.to_string(), rec.clone()))
            .collect();
        self.store.save(&by_id).await?;
        Ok(())
    }

    /// Mints a fresh agent identity and token. Returns the record and the
    /// plaintext token (the only moment it is ever available again).
    pub async fn register(
        &mut self,
        agent_name: String,
        default_interval: Option<u64>,
    ) -> AuthStoreResult<(AgentRecord, String)> {
        let now = Utc::now();
        let token = generate_token();
        let record = AgentRecord {
            id: Uuid::new_v4(),
            agent_name,
            api_token_hash: hash_token(&token),
            poll_interval_seconds: default_interval,
            last_heartbeat: None,
            last_config_version: None,
            created_at: now,
            updated_at: now,
        };
        self.by_token_hash
            .insert(record.api_token_hash.clone(), record.id);
        self.agents.insert(record.id, record.clone());
        self.persist().await?;
        Ok((record, token))
    }

    pub fn get(&self, id: Uuid) -> Option<&AgentRecord> {
        self.agents.get(&id)
    }

    pub fn list(&self) -> Vec<&AgentRecord> {
        self.agents.values().collect()
    }

    pub fn find_by_token(&self, token: &str) -> Option<&AgentRecord> {
        let hash = hash_token(token);
        self.by_token_hash
            .get(&hash)
            .and_then(|id| self.agents.get(id))
    }

    pub async fn record_heartbeat(
        &mut self,
        id: Uuid,
        config_version: String,
    ) -> AuthStoreResult<()> {
        let rec = self
            .agents
            .get_mut(&id)
            .ok_or(AuthStoreError::NotFound(id))?;
        rec.last_heartbeat = Some(Utc::now());
        rec.last_config_version = Some(config_version);
        rec.updated_at = Utc::now();
        self.persist().await
    }

    pub async fn set_interval(&mut self, id: Uuid, seconds: u64) -> AuthStoreResult<()> {
        let rec = self
            .agents
            .get_mut(&id)
            .ok_or(AuthStoreError::NotFound(id))?;
        rec.poll_interval_seconds = Some(seconds);
        rec.updated_at = Utc::now();
        self.persist().await
    }

    /// Atomically replaces an agent's token with a freshly generated one.
    /// Returns the new plaintext token.
    pub async fn rotate_token(&mut self, id: Uuid) -> AuthStoreResult<String> {
        let old_hash = {
            let rec = self
                .agents
                .get(&id)
                .ok_or(AuthStoreError::NotFound(id))?;
            rec.api_token_hash.clone()
        };
        let token = generate_token();
        let new_hash = hash_token(&token);
        {
            let rec = self.agents.get_mut(&id).expect("checked above");
            rec.api_token_hash = new_hash.clone();
            rec.updated_at = Utc::now();
        }
        self.by_token_hash.remove(&old_hash);
        self.by_token_hash.insert(new_hash, id);
        self.persist().await?;
        Ok(token)
    }

    pub async fn delete(&mut self, id: Uuid) -> AuthStoreResult<()> {
        let rec = self.agents.remove(&id).ok_or(AuthStoreError::NotFound(id))?;
        self.by_token_hash.remove(&rec.api_token_hash);
        self.persist().await
    }
}

/// One entry in the admin-facing audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub result: String,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn ok(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            resource_id: None,
            result: "ok".to_string(),
            detail: None,
        }
    }

    pub fn error(actor: impl Into<String>, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            resource_id: None,
            result: "error".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Append-only audit log, newest entries returned first on query.
#[derive(Debug)]
pub struct AuditLogStore {
    store: JsonStore,
    entries: Vec<AuditEntry>,
}

impl AuditLogStore {
    pub async fn load(state_dir: impl AsRef<Path>) -> AuthStoreResult<Self> {
        let store = JsonStore::new(state_dir, "audit_log");
        let by_id: HashMap<String, AuditEntry> = store.load().await?;
        let mut entries: Vec<AuditEntry> = by_id.into_values().collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(Self { store, entries })
    }

    pub async fn append(&mut self, entry: AuditEntry) -> AuthStoreResult<()> {
        self.entries.push(entry);
        let by_id: HashMap<String, AuditEntry> = self
            .entries
            .iter()
            .map(|e| (e.id.to_string(), e.clone()))
            .collect();
        self.store.save(&by_id).await?;
        Ok(())
    }

    /// Most recent matching entries, newest first, optionally filtered by
    /// exact actor/action match and capped by `limit`.
    pub fn query(
        &self,
        actor: Option<&str>,
        action: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<&AuditEntry> {
        let mut matching: Vec<&AuditEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| actor.is_none_or(|a| e.actor == a))
            .filter(|e| action.is_none_or(|a| e.action == a))
            .collect();
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_mints_unique_hashed_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = AgentStore::load(dir.path()).await.expect("load");
        let (rec, token) = store.register("host-a".to_string(), None).await.expect("register");
        assert_ne!(rec.api_token_hash, token);
        assert_eq!(rec.api_token_hash, hash_token(&token));
        assert!(store.find_by_token(&token).is_some());
    }

    #[tokio::test]
    async fn rotate_token_invalidates_old_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = AgentStore::load(dir.path()).await.expect("load");
        let (rec, old_token) = store.register("host-a".to_string(), None).await.expect("register");
        let new_token = store.rotate_token(rec.id).await.expect("rotate");
        assert!(store.find_by_token(&old_token).is_none());
        assert!(store.find_by_token(&new_token).is_some());
    }

    #[tokio::test]
    async fn delete_removes_token_index_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = AgentStore::load(dir.path()).await.expect("load");
        let (rec, token) = store.register("host-a".to_string(), None).await.expect("register");
        store.delete(rec.id).await.expect("delete");
        assert!(store.find_by_token(&token).is_none());
        assert!(store.get(rec.id).is_none());
    }

    #[tokio::test]
    async fn agent_store_reload_preserves_token_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = {
            let mut store = AgentStore::load(dir.path()).await.expect("load");
            let (_rec, token) = store.register("host-a".to_string(), None).await.expect("register");
            token
        };
        let reloaded = AgentStore::load(dir.path()).await.expect("reload");
        assert!(reloaded.find_by_token(&token).is_some());
    }

    #[tokio::test]
    async fn audit_query_returns_newest_first_and_respects_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = AuditLogStore::load(dir.path()).await.expect("load");
        store.append(AuditEntry::ok("admin", "config.write")).await.expect("append");
        store.append(AuditEntry::ok("admin", "agent.delete")).await.expect("append");
        let results = store.query(None, None, Some(1));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, "agent.delete");
    }

    #[tokio::test]
    async fn audit_query_filters_by_actor_and_action() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = AuditLogStore::load(dir.path()).await.expect("load");
        store.append(AuditEntry::ok("admin", "config.write")).await.expect("append");
        store.append(AuditEntry::ok("agent:1", "heartbeat")).await.expect("append");
        let results = store.query(Some("admin"), None, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].actor, "admin");
    }
}
