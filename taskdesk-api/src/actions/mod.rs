//! Agent batch-action pipeline.
//!
//! schema -> guard -> (ledger) -> executor, with the audit recorder writing
//! alongside the executor.

pub mod audit;
pub mod executor;
pub mod guard;
pub mod idempotency;
pub mod resolver;
pub mod schema;

pub use executor::{ActionResult, BatchExecutor, ExecutionError};
pub use guard::{authorize_batch, required_capability};
pub use idempotency::{LedgerLookup, PendingLedgerEntry};
pub use resolver::ReferenceMap;
pub use schema::{validate_batch, Action, ActionRequest, Batch};
