//! Access-control core for a directory server.
//!
//! Decides, for every directory operation, whether the requester is
//! permitted to perform it, and keeps the rule set live-tunable under a
//! replicated-consensus fabric.
//!
//! # Components
//!
//! - **Evaluator** ([`evaluator`]): first-match, DN-aware decisions over an
//!   ordered rule list, with per-right and per-attribute granularity
//! - **Manager** ([`manager`]): thread-safe custodian of the live policy;
//!   publishes an immutable evaluator snapshot per accepted mutation
//! - **Loader** ([`loader`]): restricted YAML-like policy-file parser with
//!   environment-variable substitution
//! - **Watcher** ([`watcher`]): polling hot-reload with debounce, safe
//!   against partial writes
//! - **Replication** ([`replication`]): consensus-log bridge so policy
//!   converges across nodes and survives restart via snapshots
//! - **Admin** ([`admin`]): the HTTP surface the REST front end mounts
//!
//! All components log through [`tracing`]; installing a subscriber is left
//! to the embedding server binary.
//!
//! # Example
//!
//! ```
//! use ldap_acl::{AccessContext, DefaultPolicy, PolicyManager, Right, Rights, Rule};
//!
//! let manager = PolicyManager::new(DefaultPolicy::Deny);
//! manager
//!     .add_rule(Rule::new("*", "cn=admin,dc=example,dc=com", Rights::ALL), None)
//!     .unwrap();
//!
//! assert!(manager.can_delete("cn=admin,dc=example,dc=com", "ou=users,dc=example,dc=com"));
//! assert!(!manager.check_access(&AccessContext::new(
//!     "",
//!     "ou=users,dc=example,dc=com",
//!     Right::Read,
//! )));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod manager;
pub mod matcher;
pub mod replication;
pub mod rule;
pub mod store;
pub mod watcher;

pub use context::{AccessContext, Entry, EntryAttribute};
pub use error::{Error, Result};
pub use evaluator::AccessEvaluator;
pub use manager::{PolicyManager, PolicyStats};
pub use replication::{ConsensusNode, PolicyCommand, ReplicatedPolicy};
pub use rule::{DefaultPolicy, Right, Rights, Rule, Scope};
pub use store::PolicyStore;
pub use watcher::PolicyWatcher;
