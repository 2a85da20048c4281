// Wire and domain models

mod command;
mod metrics;
mod session;

pub use command::{CommandAction, CommandFrame};
pub use metrics::{MetricFrame, ProcessEntry, TOP_PROCESS_COUNT};
pub use session::{AgentSummary, SessionStatus};
