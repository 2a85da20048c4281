// Hub core: session registry, command routing, frame validation

mod error;
mod registry;
mod session;

pub use error::HubError;
pub use registry::{COMMAND_SEND_TIMEOUT, RegistryStats, SessionRegistry};
pub use session::ObserverEvent;

use crate::models::MetricFrame;

/// Parse and validate one inbound metric frame.
///
/// A frame that fails here is dropped by the caller and the prior snapshot
/// survives untouched; the session stays online.
pub fn parse_frame(text: &str) -> Result<MetricFrame, HubError> {
    let frame: MetricFrame =
        serde_json::from_str(text).map_err(|e| HubError::MalformedFrame(e.to_string()))?;
    frame.check_ranges().map_err(HubError::MalformedFrame)?;
    Ok(frame)
}
