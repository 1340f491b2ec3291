//! Migration tracking.
//!
//! A [`Migration`] is a multi-step data move from the legacy system. The
//! [`MigrationManager`] drives it and its [`MigrationStep`]s through
//!
//! ```text
//! pending -> running -> completed | failed
//! ```
//!
//! and records an append-only trail of [`MigrationLog`] entries. The
//! `rolled_back` state is only ever set by rollback tooling.
//!
//! # Example
//!
//! ```ignore
//! let manager = MigrationManager::new(store, Arc::new(UuidGenerator));
//! let migration = manager.create_migration(Migration::new("users", "v2"))?;
//! manager.start_migration(&migration.id)?;
//! let step = manager.add_migration_step(MigrationStep::new(&migration.id, "copy users", 1))?;
//! manager.start_migration_step(&step.id)?;
//! manager.update_step_progress(&step.id, 500)?;
//! manager.complete_step(&step.id)?;
//! manager.complete_migration(&migration.id)?;
//! ```

mod integrity;
pub mod manager;
pub mod model;

pub use manager::MigrationManager;
pub use model::{LogLevel, Migration, MigrationLog, MigrationStatus, MigrationStep};
