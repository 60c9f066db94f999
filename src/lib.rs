pub mod api;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod events;
pub mod filter;
pub mod id;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod tag;
pub mod watcher;

pub use events::*;
pub use filter::*;
pub use id::{IdGenerator, PublicId};
pub use pipeline::{PipelineError, ReceiptOutcome, ReceiptPipeline, TagOutcome};
pub use service::{Dispatcher, ServiceSummary, WatchService};
pub use watcher::*;
