//! Script generation, execution and self-repair for recorded UI automation.

pub mod chat;
pub mod executor;
pub mod generate;
pub mod layout;
pub mod prompts;
pub mod repair;
pub mod store;

pub use chat::{ChatSession, ContextSource, selectable_files};
pub use executor::{ExecutionOutcome, ExecutorError, ProcessExecutor, ScriptExecutor};
pub use generate::{ArtifactKind, GeneratorConfig, generate_artifact};
pub use layout::AutofixLayout;
pub use repair::{LoopResult, RepairConfig, RepairError, RepairJob, RepairLoop};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, PersistenceError};
