#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`AuditorError`)
//! - [`config`]: Service configuration (`AuditorConfig`, builder)
//! - [`types`]: Domain types (`PackageDependency`, `ArtifactRef`, `Finding`, `FileAudit`)
//! - [`version`]: Ecosystem-aware version ordering and constraint matching
//! - [`manifest`]: Manifest readers (`package.json`, `pom.xml`) and discovery
//! - [`index`]: Remote index contract (`VulnerabilityIndex`), HTTP client, local snapshot
//! - [`resolver`], [`graph`], [`scm`], [`vuln`]: The four remote stages of an audit pass
//! - [`emitter`], [`event`]: Finding dispatch to listeners and event channels
//! - [`store`], [`cache`]: Property store and the staleness-window refresh cache
//! - [`scheduler`]: Deduplicating background resolution with a circuit breaker
//! - [`pipeline`]: One audit pass over one file (`AuditPipeline`)
//! - [`service`]: Assembled entry point (`AuditService`, `AuditServiceBuilder`, `Plugin` impl)
//!
//! # Architecture
//!
//! ```text
//! manifest file --> ManifestReader --> declared deps
//!                                          |
//!                                   ArtifactResolver      (1 batch call)
//!                                          |
//!                               DependencyGraphExpander   (1 call per resolved root)
//!                                          |
//!                                    ScmCorrelator        (1 batch call, weak-ref reuse)
//!                                          |
//!                                 VulnerabilityJoiner     (1 call per SCM, memoized)
//!                                          |
//!                      FindingEmitter --> listeners / mpsc --> downstream
//! ```

pub mod cache;
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod graph;
pub mod index;
pub mod manifest;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod scm;
pub mod service;
pub mod store;
pub mod types;
pub mod version;
pub mod vuln;

// --- Public API Re-exports ---

// Service (main entry point)
pub use service::{AuditService, AuditServiceBuilder, AuditStatus, AuditView, CacheSummary};

// Configuration
pub use config::{AuditorConfig, AuditorConfigBuilder};

// Error
pub use error::AuditorError;

// Events
pub use emitter::{ChannelListener, FindingEmitter, FindingListener, ListenerId, MarkerSink};
pub use event::FindingEvent;

// Types
pub use types::{
    ArtifactRef, ClassifiedVulnerability, Ecosystem, FileAudit, Finding, FindingNotice,
    FindingSeverity, PackageDependency, ScmRef, SourcePosition, VulnerabilityRecord,
};

// Index
pub use index::{HttpIndexClient, LocalIndex, VulnerabilityIndex};

// Pipeline stages
pub use graph::DependencyGraphExpander;
pub use pipeline::AuditPipeline;
pub use resolver::ArtifactResolver;
pub use scm::ScmCorrelator;
pub use vuln::VulnerabilityJoiner;

// Cache and scheduling
pub use cache::{CacheState, Clock, ManualClock, RefreshCache, SystemClock};
pub use scheduler::{BatchRunner, ResolutionScheduler, SchedulerEvent};
pub use store::{JsonFileStore, MemoryStore, PropertyStore};
