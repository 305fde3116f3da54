//! Web check pipeline: a scheduler that decides which sites are due and hands
//! check jobs to workers over a Redis stream consumer group, and a worker that
//! probes each site over HTTP, grades the page, reports the result to the
//! backend and acknowledges the job.
//!
//! Every backend the pipeline talks to sits behind a trait
//! ([`SiteRegistry`], [`LastCheckStore`], [`StreamStore`]) with a Redis and an
//! in-memory implementation.

pub mod codec;
pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod stream;
pub mod types;
pub mod worker;

pub use config::Config;
pub use error::{Result, WebcheckError};
pub use registry::{RedisSiteRegistry, SiteRegistry, StaticSiteRegistry};
pub use scheduler::{DueCheckEvaluator, JobProducer, PassReport};
pub use store::{LastCheckStore, MemoryLastCheckStore, RedisLastCheckStore};
pub use stream::{MemoryStreamStore, RedisStreamStore, StreamEntry, StreamStore};
pub use types::{CheckJob, CheckResult, CheckStatus, Site};
pub use worker::{CheckExecutor, ConsumerSettings, ReportOutcome, ResultReporter, Worker};
