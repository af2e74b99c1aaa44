pub mod error;
pub mod model;
pub mod producer;

pub use error::{Disposition, JobError};
pub use model::{CompletionEvent, JobMessage, JobStatus, Operation};
pub use producer::JobProducer;
