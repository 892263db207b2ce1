//! todoist-sync-daemon library: Exposes the daemon components for testing.
//!
//! This is a thin layer over todoist-sync-core that adds the native
//! filesystem, the Todoist HTTP client, settings and the scheduler.

pub mod client;
pub mod config;
pub mod device;
pub mod native_fs;
pub mod scheduler;

// Re-export key types for convenience
pub use client::TodoistClient;
pub use config::{Args, Config, ConfigError, Settings};
pub use device::DeviceGuard;
pub use native_fs::NativeFs;
pub use scheduler::{RunOutcome, SyncJob, SyncScheduler};
