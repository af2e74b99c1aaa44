pub mod executor;
pub mod processor;

pub use executor::{DelegatedExecutor, JobExecutor, LocalExecutor};
pub use processor::{CycleReport, MessageOutcome, Worker};
