pub mod aws;
pub mod compute;
pub mod notify;
pub mod queue;
pub mod storage;
