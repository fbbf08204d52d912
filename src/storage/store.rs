//! JSON-file ledger store with an in-memory cache and merge-before-write.
//!
//! Two logically distinct writers (check-in history and daily-stats
//! updates) touch the same group file, so a save never overwrites the whole
//! document from cache: it re-reads the file, overlays only the records the
//! mutation actually changed, and writes back the union. Writes go to a
//! temp file and are renamed into place so a crash mid-write leaves the old
//! document intact.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Local, Utc};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use crate::error::LedgerError;
use crate::storage::models::{DailyCycleStats, LedgerDocument, UserLedgerRecord};

/// Which ledger document an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The cross-group aggregate document.
    Global,
    Group(String),
}

/// A batch of changes to commit to one scope's document. Only the listed
/// users and cycle-stats entries are overlaid onto the on-disk state;
/// everything else in the document is preserved as found.
#[derive(Debug, Default)]
pub struct ScopedMutation {
    pub users: Vec<UserLedgerRecord>,
    pub daily_stats: Vec<DailyCycleStats>,
    pub group_name: Option<String>,
}

pub struct LedgerStore {
    data_dir: PathBuf,
    cache: RwLock<HashMap<Scope, LedgerDocument>>,
    /// Per-(scope, user) mutexes serializing read-compute-persist sequences.
    user_locks: Mutex<HashMap<(Scope, String), Arc<Mutex<()>>>>,
    /// Per-scope mutexes serializing the read-merge-rename inside `commit`.
    write_locks: Mutex<HashMap<Scope, Arc<Mutex<()>>>>,
    /// Per-scope mutexes handed to callers whose read-compute-commit spans
    /// scope-wide state (e.g. arrival order), not just one user record.
    scope_locks: Mutex<HashMap<Scope, Arc<Mutex<()>>>>,
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Group ids come from the host platform and may contain path separators;
/// collapse anything unsafe before using them as a file stem. Ids that
/// needed sanitizing get a hash suffix so "a b" and "a_b" cannot collapse
/// onto the same file.
fn file_stem(group_id: &str) -> String {
    let sanitized: String = group_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if sanitized == group_id {
        sanitized
    } else {
        format!("{}-{:016x}", sanitized, fnv1a64(group_id.as_bytes()))
    }
}

impl LedgerStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: RwLock::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Global => self.data_dir.join("global.json"),
            Scope::Group(id) => self
                .data_dir
                .join("groups")
                .join(format!("{}.json", file_stem(id))),
        }
    }

    /// Handle to the mutex serializing mutations for one (scope, user) pair.
    /// Callers hold the guard across read-compute-persist and must not hold
    /// it across unrelated network calls.
    pub async fn user_lock(&self, scope: &Scope, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry((scope.clone(), user_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handle to the mutex serializing scope-wide read-compute-commit
    /// sequences such as arrival-order assignment, where the state being
    /// raced on is the whole document rather than one user record.
    pub async fn scope_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        let mut locks = self.scope_locks.lock().await;
        locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn write_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reads a scope's document from disk. Missing files and corrupt JSON
    /// both fall back to an empty default; corruption is logged, never
    /// propagated to the caller on the read path.
    async fn read_from_disk(&self, scope: &Scope) -> LedgerDocument {
        let path = self.path_for(scope);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return LedgerDocument::default();
            }
            Err(err) => {
                tracing::warn!(target: "storage", path = %path.display(), %err, "ledger file unreadable, starting empty");
                return LedgerDocument::default();
            }
        };
        match serde_json::from_slice::<LedgerDocument>(&raw) {
            Ok(mut doc) => {
                doc.migrate();
                doc
            }
            Err(err) => {
                tracing::warn!(target: "storage", path = %path.display(), %err, "ledger file corrupt, starting empty");
                LedgerDocument::default()
            }
        }
    }

    async fn ensure_loaded(&self, scope: &Scope) {
        if self.cache.read().await.contains_key(scope) {
            return;
        }
        let doc = self.read_from_disk(scope).await;
        let mut cache = self.cache.write().await;
        cache.entry(scope.clone()).or_insert(doc);
    }

    /// Snapshot of a whole scope document (cached after first load).
    pub async fn document(&self, scope: &Scope) -> LedgerDocument {
        self.ensure_loaded(scope).await;
        self.cache
            .read()
            .await
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Fresh lookup of one user record; callers get a clone, never a
    /// long-lived reference into the cache.
    pub async fn get_user(&self, scope: &Scope, user_id: &str) -> Option<UserLedgerRecord> {
        self.ensure_loaded(scope).await;
        self.cache
            .read()
            .await
            .get(scope)
            .and_then(|doc| doc.users.get(user_id))
            .cloned()
    }

    pub async fn cycle_stats(&self, scope: &Scope, cycle_id: &str) -> Option<DailyCycleStats> {
        self.ensure_loaded(scope).await;
        self.cache
            .read()
            .await
            .get(scope)
            .and_then(|doc| doc.daily_stats.get(cycle_id))
            .cloned()
    }

    /// Merge-and-save: re-reads the on-disk document, overlays the
    /// mutation's users and cycle stats, writes the union atomically, and
    /// on success installs the merged document as the new cache entry.
    ///
    /// On a write failure the cache is re-pointed at the on-disk state so
    /// the in-memory view never claims a mutation that was not persisted.
    ///
    /// The whole read-merge-write runs under a per-scope mutex so two
    /// concurrent commits cannot each read the pre-image and clobber the
    /// other's merge.
    pub async fn commit(
        &self,
        scope: &Scope,
        mutation: ScopedMutation,
    ) -> Result<(), LedgerError> {
        let lock = self.write_lock(scope).await;
        let _guard = lock.lock().await;
        let mut doc = self.read_from_disk(scope).await;
        if let Some(name) = mutation.group_name {
            doc.group_name = Some(name);
        }
        for user in mutation.users {
            doc.users.insert(user.user_id.clone(), user);
        }
        for stats in mutation.daily_stats {
            doc.daily_stats.insert(stats.cycle_id.clone(), stats);
        }
        doc.data_version = crate::storage::models::DATA_VERSION;

        match self.write_document(scope, &doc).await {
            Ok(()) => {
                self.cache.write().await.insert(scope.clone(), doc);
                Ok(())
            }
            Err(err) => {
                // Roll the cache back to whatever the disk actually holds.
                let disk = self.read_from_disk(scope).await;
                self.cache.write().await.insert(scope.clone(), disk);
                Err(err)
            }
        }
    }

    async fn write_document(
        &self,
        scope: &Scope,
        doc: &LedgerDocument,
    ) -> Result<(), LedgerError> {
        let path = self.path_for(scope);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(doc)?;
        // Unique temp name per write so overlapping writers never rename
        // each other's file out from under them.
        let tmp = path.with_extension(format!(
            "json.tmp-{:08x}",
            rand::rng().random_range(0u32..=u32::MAX)
        ));
        tokio::fs::write(&tmp, &payload).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Group ids with an on-disk document.
    pub async fn list_groups(&self) -> Vec<String> {
        let dir = self.data_dir.join("groups");
        let mut groups = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return groups,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                groups.push(stem.to_string());
            }
        }
        groups.sort();
        groups
    }

    /// Drops history and transaction entries older than `horizon_days`
    /// from every known document. Old entries vanish; counters and
    /// balances are untouched.
    pub async fn run_retention(&self, horizon_days: u32) -> Result<(), LedgerError> {
        let cutoff_utc = Utc::now() - Duration::days(horizon_days as i64);
        // History timestamps are local wall-clock times, so their cutoff
        // must be computed on the same clock.
        let cutoff_naive = (Local::now() - Duration::days(horizon_days as i64)).naive_local();
        let mut scopes = vec![Scope::Global];
        scopes.extend(self.list_groups().await.into_iter().map(Scope::Group));

        for scope in scopes {
            let mut doc = self.document(&scope).await;
            let mut touched = Vec::new();
            for record in doc.users.values_mut() {
                let before =
                    record.checkin_history.len() + record.transactions.len();
                record.checkin_history.retain(|e| e.time >= cutoff_naive);
                record.transactions.retain(|t| t.timestamp >= cutoff_utc);
                if record.checkin_history.len() + record.transactions.len() != before {
                    touched.push(record.clone());
                }
            }
            if !touched.is_empty() {
                self.commit(
                    &scope,
                    ScopedMutation {
                        users: touched,
                        ..ScopedMutation::default()
                    },
                )
                .await?;
            }
        }
        Ok(())
    }
}
