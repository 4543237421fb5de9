// ABOUTME: Migration pipeline: batch transfer, sanity checks and structure sync
// ABOUTME: The orchestrator runs them table by table following a migration plan

pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod rename;
pub mod sanity;
pub mod structure;
pub mod transfer;

pub use orchestrator::{Orchestrator, DEFAULT_BATCH_SIZE};
pub use plan::{MigrationPlan, ResolvedTables, TableSelector};
pub use progress::{
    MigrationEvent, MigrationReport, ProgressSink, StructureOutcome, StructureResult,
    TableProgress, TableStatus, TracingSink,
};
pub use rename::rename_columns_to_lowercase;
pub use sanity::{SanityConfig, SanityVerifier};
pub use structure::{plan_structure_sync, StructurePlan, StructureSynchronizer};
pub use transfer::{BatchTransfer, TransferReport};
