mod client;
mod session;

pub use client::{PicsClient, PicsManager};
pub use session::{PicsCommand, PicsRequest, PicsResponse, PicsResult, SessionStatus};
