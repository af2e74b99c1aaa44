//! Background worker for the image-hosting API's transformation pipeline.
//!
//! Producers enqueue [`JobMessage`](modules::jobs::JobMessage)s; the [`Worker`](workers::Worker)
//! leases them from the queue, runs the operations, stores `processed-<key>`,
//! publishes a [`CompletionEvent`](modules::jobs::CompletionEvent) and acknowledges.
//! Anything that fails before acknowledgment is redelivered by the queue.

pub mod app;
pub mod config;
pub mod infrastructure;
pub mod modules;
pub mod state;
pub mod workers;
