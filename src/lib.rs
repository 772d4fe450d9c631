//! ChaosDR - automated disaster-recovery drills for cluster workloads.
//!
//! A DR test backs up an application, injects a controlled failure, restores
//! the backup into an isolated sandbox namespace, validates the restored
//! copy and records an attestation proof of the outcome.
//!
//! # Features
//!
//! - **Pluggable backup engines**: Velero and Restic behind one contract.
//! - **Chaos registry**: `pod-delete` and `network-delay` built in, new types
//!   plug in without touching dispatch.
//! - **Convergence wait**: restores start once the fault is observed, not
//!   after a fixed sleep.
//! - **Validation**: script, HTTP probe and data-query checks, fail-fast.
//! - **Attestation**: evidence digests submitted to a proof service.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Orchestrator                           │
//! │   per-identity lock │ status store │ metrics sink           │
//! ├──────────────┬───────────────┬──────────────┬───────────────┤
//! │ BackupEngine │ ChaosRegistry │  Validator   │ Attestation   │
//! │ velero/restic│ pod/network   │ script/http/ │ HTTP client   │
//! │              │ + EffectWaiter│ query        │               │
//! └──────────────┴───────────────┴──────────────┴───────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use chaosdr::orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
//! use chaosdr::shutdown::CancellationSignal;
//!
//! let orchestrator = Orchestrator::new(parts, OrchestratorSettings::from(&config));
//! let outcome = orchestrator
//!     .execute(&identity, &spec, &CancellationSignal::never())
//!     .await;
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod attestation;
pub mod backup;
pub mod chaos;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod shutdown;
pub mod validation;
pub mod wait;

pub use error::{DrError, Result};
pub use types::*;
