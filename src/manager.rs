//! Thread-safe custodian of the live policy.
//!
//! The manager owns the current [`PolicyStore`] snapshot and its
//! [`AccessEvaluator`]. Readers take a read-lock and clone the inner `Arc`;
//! mutators build the successor snapshot and swap the whole `Arc` under a
//! write-lock, so a reader is never blocked for more than the swap and
//! never observes a torn snapshot. Readers that captured a snapshot before
//! an update keep using it safely.
//!
//! Every accepted mutation — administrative, replicated, or file reload —
//! rebuilds the evaluator, bumps the strictly monotonic version, stamps
//! `last_reload`, and increments the reload counter. A rejected mutation
//! leaves the snapshot and version untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{AccessContext, Entry};
use crate::evaluator::AccessEvaluator;
use crate::loader;
use crate::rule::{DefaultPolicy, Rule};
use crate::store::PolicyStore;
use crate::{Error, Result};

/// Mutable custodian of the rule list and default policy.
///
/// One manager per process serves every directory-operation hot path
/// concurrently with administrative mutation and watcher-triggered reloads.
#[derive(Debug)]
pub struct PolicyManager {
    file_path: Option<PathBuf>,
    state: RwLock<ManagerState>,
    version: AtomicU64,
    reload_count: AtomicU64,
}

#[derive(Debug)]
struct ManagerState {
    store: Arc<PolicyStore>,
    evaluator: Arc<AccessEvaluator>,
    last_reload: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
}

impl ManagerState {
    fn publish(&mut self, store: PolicyStore) {
        let store = Arc::new(store);
        self.evaluator = Arc::new(AccessEvaluator::new(Arc::clone(&store)));
        self.store = store;
        self.last_reload = Some(Utc::now());
    }
}

/// Point-in-time statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyStats {
    /// Configured policy file path, if any.
    pub file_path: Option<String>,
    /// Rules in the current snapshot.
    pub rule_count: usize,
    /// Current default policy.
    pub default_policy: DefaultPolicy,
    /// Current snapshot version.
    pub version: u64,
    /// Accepted mutations (including reloads) since construction.
    pub reload_count: u64,
    /// When the current snapshot was published.
    pub last_reload: Option<DateTime<Utc>>,
    /// Most recent reload failure, if any.
    pub last_error: Option<String>,
    /// When the most recent reload failure happened.
    pub last_error_time: Option<DateTime<Utc>>,
}

impl PolicyManager {
    /// Manager with no rules and the given default policy.
    #[must_use]
    pub fn new(default_policy: DefaultPolicy) -> Self {
        Self::from_store(PolicyStore::new(default_policy))
    }

    /// Manager seeded with a prepared store.
    #[must_use]
    pub fn from_store(store: PolicyStore) -> Self {
        let version = store.version();
        let store = Arc::new(store);
        let evaluator = Arc::new(AccessEvaluator::new(Arc::clone(&store)));
        Self {
            file_path: None,
            state: RwLock::new(ManagerState {
                store,
                evaluator,
                last_reload: Some(Utc::now()),
                last_error: None,
                last_error_time: None,
            }),
            version: AtomicU64::new(version),
            reload_count: AtomicU64::new(0),
        }
    }

    /// Manager backed by a policy file; loads it eagerly.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = loader::load_policy_file(&path)?;
        let mut manager = Self::from_store(store);
        manager.file_path = Some(path);
        Ok(manager)
    }

    /// Configured policy file path, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    // ── Read path ─────────────────────────────────────────────────────

    /// Current evaluator snapshot. Decisions made against the returned
    /// evaluator stay internally consistent even if a mutation lands
    /// concurrently.
    #[must_use]
    pub fn evaluator(&self) -> Arc<AccessEvaluator> {
        Arc::clone(&self.state.read().evaluator)
    }

    /// Current policy snapshot.
    #[must_use]
    pub fn store(&self) -> Arc<PolicyStore> {
        Arc::clone(&self.state.read().store)
    }

    /// Current snapshot version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Whether `ctx.operation` on `ctx.target_dn` is permitted.
    #[must_use]
    pub fn check_access(&self, ctx: &AccessContext) -> bool {
        self.evaluator().check_access(ctx)
    }

    /// Attribute-granular [`check_access`](Self::check_access).
    #[must_use]
    pub fn check_attribute_access(&self, ctx: &AccessContext, attribute: &str) -> bool {
        self.evaluator().check_attribute_access(ctx, attribute)
    }

    /// Project an entry down to its readable attributes.
    #[must_use]
    pub fn filter_attributes(&self, ctx: &AccessContext, entry: Option<&Entry>) -> Option<Entry> {
        self.evaluator().filter_attributes(ctx, entry)
    }

    /// Keep only the readable attribute names, preserving order.
    #[must_use]
    pub fn filter_attribute_list(&self, ctx: &AccessContext, attributes: &[String]) -> Vec<String> {
        self.evaluator().filter_attribute_list(ctx, attributes)
    }

    /// Whether `bind_dn` may read `target_dn`.
    #[must_use]
    pub fn can_read(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_read(bind_dn, target_dn)
    }

    /// Whether `bind_dn` may modify `target_dn`.
    #[must_use]
    pub fn can_write(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_write(bind_dn, target_dn)
    }

    /// Whether `bind_dn` may add entries under `target_dn`.
    #[must_use]
    pub fn can_add(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_add(bind_dn, target_dn)
    }

    /// Whether `bind_dn` may delete `target_dn`.
    #[must_use]
    pub fn can_delete(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_delete(bind_dn, target_dn)
    }

    /// Whether `bind_dn` may search under `target_dn`.
    #[must_use]
    pub fn can_search(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_search(bind_dn, target_dn)
    }

    /// Whether `bind_dn` may compare attribute values on `target_dn`.
    #[must_use]
    pub fn can_compare(&self, bind_dn: &str, target_dn: &str) -> bool {
        self.evaluator().can_compare(bind_dn, target_dn)
    }

    // ── Write path (local mutations) ──────────────────────────────────

    /// Insert `rule` at `index`; `None` or an index past the end appends.
    pub fn add_rule(&self, rule: Rule, index: Option<usize>) -> Result<()> {
        self.mutate(|store| {
            rule.validate(index.unwrap_or(store.rule_count()).min(store.rule_count()))?;
            store.insert_rule(index, rule);
            Ok(())
        })
    }

    /// Replace the rule at `index`.
    pub fn update_rule(&self, index: usize, rule: Rule) -> Result<()> {
        self.mutate(|store| {
            rule.validate(index)?;
            store.update_rule(index, rule)
        })
    }

    /// Remove the rule at `index`.
    pub fn delete_rule(&self, index: usize) -> Result<()> {
        self.mutate(|store| store.delete_rule(index))
    }

    /// Set the default policy; accepts only `allow` or `deny`
    /// (case-insensitive).
    pub fn set_default_policy(&self, policy: &str) -> Result<()> {
        let parsed = DefaultPolicy::parse(policy)?;
        self.mutate(|store| {
            store.set_default_policy(parsed);
            Ok(())
        })
    }

    /// Re-read the configured policy file and swap it in.
    ///
    /// On any failure the current snapshot stays live and the error is
    /// recorded with its timestamp in the statistics.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.file_path else {
            return Err(Error::FileNotConfigured);
        };

        // File I/O happens before the exclusive section; the lock is held
        // only across the swap.
        match loader::load_policy_file(path) {
            Ok(mut store) => {
                let mut state = self.state.write();
                let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
                store.set_version(version);
                state.publish(store);
                drop(state);
                self.reload_count.fetch_add(1, Ordering::SeqCst);
                info!(path = %path.display(), version, "Policy reloaded");
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write();
                state.last_error = Some(e.to_string());
                state.last_error_time = Some(Utc::now());
                Err(e)
            }
        }
    }

    /// Serialize the current snapshot back to the configured policy file.
    pub fn save_to_file(&self) -> Result<()> {
        let Some(path) = &self.file_path else {
            return Err(Error::FileNotConfigured);
        };
        let store = self.store();
        std::fs::write(path, loader::render_policy_file(&store))?;
        info!(path = %path.display(), "Policy saved");
        Ok(())
    }

    // ── Write path (replicated mutations) ─────────────────────────────
    //
    // The `*_from_raft` variants are called by the consensus apply path on
    // every node, including the leader. Each committed command carries the
    // version the proposer assigned; a command whose version is not past
    // the current one is a replay and is skipped, which keeps application
    // idempotent across log replays and snapshot restores.

    /// Apply a committed add-rule command.
    pub fn add_rule_from_raft(&self, rule: Rule, index: Option<usize>, version: u64) -> Result<()> {
        self.apply_replicated(version, |store| {
            rule.validate(index.unwrap_or(store.rule_count()).min(store.rule_count()))?;
            store.insert_rule(index, rule);
            Ok(())
        })
    }

    /// Apply a committed update-rule command.
    pub fn update_rule_from_raft(&self, index: usize, rule: Rule, version: u64) -> Result<()> {
        self.apply_replicated(version, |store| {
            rule.validate(index)?;
            store.update_rule(index, rule)
        })
    }

    /// Apply a committed delete-rule command. A missing index succeeds
    /// silently so duplicate deletes replayed by the log stay harmless.
    pub fn delete_rule_from_raft(&self, index: usize, version: u64) -> Result<()> {
        self.apply_replicated(version, |store| {
            if index < store.rule_count() {
                store.delete_rule(index)?;
            } else {
                debug!(index, "delete_rule_from_raft: index already gone");
            }
            Ok(())
        })
    }

    /// Apply a committed set-default-policy command.
    pub fn set_default_policy_from_raft(
        &self,
        policy: DefaultPolicy,
        version: u64,
    ) -> Result<()> {
        self.apply_replicated(version, |store| {
            store.set_default_policy(policy);
            Ok(())
        })
    }

    // ── Snapshots ─────────────────────────────────────────────────────

    /// Serialize the current snapshot as the stable JSON blob
    /// `{"version", "defaultPolicy", "rules"[]}`.
    pub fn get_snapshot(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&*self.store())?)
    }

    /// Deserialize, validate, and atomically install a snapshot blob,
    /// adopting its version.
    pub fn restore_snapshot(&self, data: &[u8]) -> Result<()> {
        let store: PolicyStore = serde_json::from_slice(data)?;
        store.validate()?;
        let version = store.version();
        let mut state = self.state.write();
        self.version.store(version, Ordering::SeqCst);
        state.publish(store);
        drop(state);
        self.reload_count.fetch_add(1, Ordering::SeqCst);
        info!(version, "Policy snapshot restored");
        Ok(())
    }

    // ── Statistics ────────────────────────────────────────────────────

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PolicyStats {
        let state = self.state.read();
        PolicyStats {
            file_path: self.file_path.as_ref().map(|p| p.display().to_string()),
            rule_count: state.store.rule_count(),
            default_policy: state.store.default_policy(),
            version: self.version.load(Ordering::SeqCst),
            reload_count: self.reload_count.load(Ordering::SeqCst),
            last_reload: state.last_reload,
            last_error: state.last_error.clone(),
            last_error_time: state.last_error_time,
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut PolicyStore) -> Result<()>,
    {
        let mut state = self.state.write();
        let mut store = (*state.store).clone();
        f(&mut store)?;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        store.set_version(version);
        state.publish(store);
        drop(state);
        self.reload_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn apply_replicated<F>(&self, version: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut PolicyStore) -> Result<()>,
    {
        let mut state = self.state.write();
        if version <= self.version.load(Ordering::SeqCst) {
            debug!(version, current = self.version.load(Ordering::SeqCst), "Skipping replayed policy command");
            return Ok(());
        }
        let mut store = (*state.store).clone();
        f(&mut store)?;
        store.set_version(version);
        self.version.store(version, Ordering::SeqCst);
        state.publish(store);
        drop(state);
        self.reload_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
