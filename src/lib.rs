//! Per-environment ledger of applied one-shot deploy migrations.
//!
//! A host task runner embeds this crate through [`session::DeploySession`]:
//! call [`DeploySession::is_valid`](session::DeploySession::is_valid) before
//! each migration job and [`DeploySession::update`](session::DeploySession::update)
//! once after the deploy. [`status::list`] reports the state of local
//! migration files without changing anything. The `mledger` binary is a thin
//! CLI over the same calls.
pub mod apply;
pub mod config;
pub mod ledger;
pub mod remote;
pub mod session;
pub mod status;
pub mod tasks;
pub mod util;

pub use config::{load_config, LedgerConfig};
pub use remote::{SshTransport, Transport};
pub use session::{DeploySession, DriftNotice, SyncReport};
