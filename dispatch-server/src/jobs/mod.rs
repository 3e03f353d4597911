//! Background jobs - 延迟任务运行器
//!
//! The runner only guarantees that a due job's handler runs and gets a
//! bounded number of infrastructure retries. Business-level retry policy
//! (how many search rounds, what backoff) belongs to the dispatch
//! coordinator, which encodes it in the jobs it enqueues.

mod runner;

pub use runner::{JobError, JobHandler, JobRunner, TokioJobRunner};
