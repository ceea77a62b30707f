#![recursion_limit = "256"]

pub mod api;
pub mod documents;
pub mod http;
pub mod jobs;
pub mod library;
pub mod pics;
pub mod util;

mod status;
pub use status::Status;

mod tracing;
pub use crate::tracing::Tracing;
