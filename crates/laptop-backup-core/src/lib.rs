//! # laptop-backup-core
//!
//! Core library for laptop-backup providing:
//! - The storage policy model (keys, bucket posture, lifecycle rules, registry records)
//! - Validation of lifecycle rule sets and resource names
//! - Deterministic, deployment-scoped naming
//! - Configuration loading (backup.yaml)

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::{BackupConfig, ConfigOverrides, ResolvedConfig};
pub use error::{Error, ErrorKind, Result};
