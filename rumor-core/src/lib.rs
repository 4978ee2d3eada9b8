//! # Rumor Core Library
//!
//! Models how a piece of unverified information originates, passes from
//! agent to agent, changes wording as it is retold, and gains or loses
//! credibility over time.
//!
//! Every [`Rumor`] owns two append-only structures:
//!
//! - **Lineage**: every wording, as a tree rooted at the original statement
//! - **Ledger**: every spread record: who heard which wording, from whom,
//!   and how much they believe it
//!
//! The aggregate is pure computation. Clock and randomness are passed in;
//! storage, caching and per-rumor locking live in [`RumorService`] and the
//! [`repository`] implementations.
//!
//! ```no_run
//! use rumor_core::{RumorConfig, RumorService, SpreadRequest};
//! use rumor_core::validation::RawRumorInput;
//!
//! let service = RumorService::in_memory(RumorConfig::default())?;
//! let rumor = service.create(RawRumorInput {
//!     originator: "miller".into(),
//!     content: "The baron hid gold at the mill".into(),
//!     severity: "minor".into(),
//!     truth_value: 0.3,
//!     ..RawRumorInput::default()
//! })?;
//! let outcome = service.spread(rumor.id, SpreadRequest::new("miller", "smith"))?;
//! println!("smith believes it at {:.2}", outcome.believability);
//! # Ok::<(), rumor_core::RumorError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod belief;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lineage;
pub mod logging;
pub mod metrics;
pub mod mutation;
pub mod persistence;
pub mod repository;
pub mod rumor;
pub mod service;
pub mod types;
pub mod validation;

pub use config::RumorConfig;
pub use error::{ErrorKind, RumorError};
pub use rumor::{NewRumor, Rumor, SpreadOutcome, SpreadRequest};
pub use service::RumorService;
pub use types::*;
