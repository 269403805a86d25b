//! Replicated policy mutator: bridges the manager to a consensus log.
//!
//! The consensus layer itself is out of scope; this module relies only on
//! its interface. Administrative mutations are proposed on the leader and
//! applied on every node (leader included) when the log commits them; a
//! non-leader rejects mutations with the current leader's address so the
//! caller can forward. Full-state snapshots reuse the manager's stable
//! JSON blob.
//!
//! Commands carry the version the proposer assigned, so replayed log
//! entries are recognised and skipped by the manager's `*_from_raft`
//! application path.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::manager::PolicyManager;
use crate::rule::{DefaultPolicy, Rule};
use crate::{Error, Result};

/// Interface to the consensus layer.
///
/// Implementations are expected to deliver committed entries to
/// [`ReplicatedPolicy::apply`] in commit order, on a single application
/// thread, on every node.
#[async_trait]
pub trait ConsensusNode: Send + Sync {
    /// Whether this node currently holds leadership.
    fn is_leader(&self) -> bool;

    /// Address of the current leader, when known.
    fn leader_address(&self) -> Option<String>;

    /// Replicate an entry; resolves once the entry commits or fails.
    /// Timeout behaviour is inherited from the caller.
    async fn propose(&self, entry: Vec<u8>) -> Result<()>;
}

/// One replicated policy mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PolicyCommand {
    /// Insert a rule (`index: None` appends).
    AddRule {
        /// Rule to insert.
        rule: Rule,
        /// Insertion position; `None` or past-the-end appends.
        #[serde(default)]
        index: Option<usize>,
        /// Version assigned by the proposer.
        version: u64,
    },
    /// Replace the rule at `index`.
    UpdateRule {
        /// Replacement rule.
        rule: Rule,
        /// Position to replace.
        index: usize,
        /// Version assigned by the proposer.
        version: u64,
    },
    /// Remove the rule at `index`.
    DeleteRule {
        /// Position to remove.
        index: usize,
        /// Version assigned by the proposer.
        version: u64,
    },
    /// Replace the default policy.
    SetDefaultPolicy {
        /// New default policy.
        policy: DefaultPolicy,
        /// Version assigned by the proposer.
        version: u64,
    },
}

impl PolicyCommand {
    /// Serialize for the consensus log.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a committed log entry.
    pub fn decode(entry: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(entry)?)
    }

    /// The version the proposer assigned.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::AddRule { version, .. }
            | Self::UpdateRule { version, .. }
            | Self::DeleteRule { version, .. }
            | Self::SetDefaultPolicy { version, .. } => *version,
        }
    }
}

/// Policy mutator that is cluster-aware when given a [`ConsensusNode`] and
/// applies directly to the manager otherwise.
pub struct ReplicatedPolicy {
    manager: Arc<PolicyManager>,
    node: Option<Arc<dyn ConsensusNode>>,
}

impl ReplicatedPolicy {
    /// Single-node mode: mutations apply directly.
    #[must_use]
    pub fn standalone(manager: Arc<PolicyManager>) -> Self {
        Self {
            manager,
            node: None,
        }
    }

    /// Cluster mode: mutations are proposed through `node` and applied via
    /// [`apply`](Self::apply) once committed.
    #[must_use]
    pub fn clustered(manager: Arc<PolicyManager>, node: Arc<dyn ConsensusNode>) -> Self {
        Self {
            manager,
            node: Some(node),
        }
    }

    /// The managed policy.
    #[must_use]
    pub fn manager(&self) -> &Arc<PolicyManager> {
        &self.manager
    }

    /// Whether mutations go through a consensus log.
    #[must_use]
    pub fn is_clustered(&self) -> bool {
        self.node.is_some()
    }

    // ── Mutations (admin API entry points) ────────────────────────────

    /// Insert `rule` at `index` (`None` appends).
    pub async fn add_rule(&self, rule: Rule, index: Option<usize>) -> Result<()> {
        rule.validate(index.unwrap_or_else(|| self.manager.store().rule_count()))?;
        match &self.node {
            None => self.manager.add_rule(rule, index),
            Some(node) => {
                self.ensure_leader(node.as_ref())?;
                let command = PolicyCommand::AddRule {
                    rule,
                    index,
                    version: self.next_version(),
                };
                self.propose(node.as_ref(), &command).await
            }
        }
    }

    /// Replace the rule at `index`.
    pub async fn update_rule(&self, index: usize, rule: Rule) -> Result<()> {
        rule.validate(index)?;
        match &self.node {
            None => self.manager.update_rule(index, rule),
            Some(node) => {
                self.ensure_leader(node.as_ref())?;
                self.ensure_in_range(index)?;
                let command = PolicyCommand::UpdateRule {
                    rule,
                    index,
                    version: self.next_version(),
                };
                self.propose(node.as_ref(), &command).await
            }
        }
    }

    /// Remove the rule at `index`.
    pub async fn delete_rule(&self, index: usize) -> Result<()> {
        match &self.node {
            None => self.manager.delete_rule(index),
            Some(node) => {
                self.ensure_leader(node.as_ref())?;
                self.ensure_in_range(index)?;
                let command = PolicyCommand::DeleteRule {
                    index,
                    version: self.next_version(),
                };
                self.propose(node.as_ref(), &command).await
            }
        }
    }

    /// Set the default policy; accepts only `allow` or `deny`.
    pub async fn set_default_policy(&self, policy: &str) -> Result<()> {
        let parsed = DefaultPolicy::parse(policy)?;
        match &self.node {
            None => self.manager.set_default_policy(policy),
            Some(node) => {
                self.ensure_leader(node.as_ref())?;
                let command = PolicyCommand::SetDefaultPolicy {
                    policy: parsed,
                    version: self.next_version(),
                };
                self.propose(node.as_ref(), &command).await
            }
        }
    }

    // ── Consensus callbacks ───────────────────────────────────────────

    /// Apply one committed log entry. Called on every node, in commit
    /// order.
    ///
    /// A command that cannot be deserialised is fatal for this node's
    /// state machine: the error propagates and the caller must halt
    /// application. Replays of already-applied commands are skipped by
    /// the manager.
    pub fn apply(&self, entry: &[u8]) -> Result<()> {
        let command = PolicyCommand::decode(entry).inspect_err(|e| {
            error!(error = %e, "Undecodable policy command in consensus log");
        })?;
        debug!(version = command.version(), "Applying committed policy command");
        match command {
            PolicyCommand::AddRule {
                rule,
                index,
                version,
            } => self.manager.add_rule_from_raft(rule, index, version),
            PolicyCommand::UpdateRule {
                rule,
                index,
                version,
            } => self.manager.update_rule_from_raft(index, rule, version),
            PolicyCommand::DeleteRule { index, version } => {
                self.manager.delete_rule_from_raft(index, version)
            }
            PolicyCommand::SetDefaultPolicy { policy, version } => {
                self.manager.set_default_policy_from_raft(policy, version)
            }
        }
    }

    /// Serialize full state for a consensus-requested snapshot.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.manager.get_snapshot()
    }

    /// Install a snapshot received from the consensus layer.
    pub fn restore(&self, data: &[u8]) -> Result<()> {
        self.manager.restore_snapshot(data)
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn ensure_leader(&self, node: &dyn ConsensusNode) -> Result<()> {
        if node.is_leader() {
            Ok(())
        } else {
            Err(Error::NotLeader {
                leader: node.leader_address(),
            })
        }
    }

    fn ensure_in_range(&self, index: usize) -> Result<()> {
        let len = self.manager.store().rule_count();
        if index < len {
            Ok(())
        } else {
            Err(Error::OutOfRange { index, len })
        }
    }

    fn next_version(&self) -> u64 {
        self.manager.version() + 1
    }

    async fn propose(&self, node: &dyn ConsensusNode, command: &PolicyCommand) -> Result<()> {
        let entry = command.encode()?;
        node.propose(entry)
            .await
            .map_err(|e| Error::Replication(e.to_string()))
    }
}
