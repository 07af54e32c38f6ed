pub mod bus;
pub mod capture;

use thiserror::Error;

pub use bus::{
    EventBus, EventTarget, EventType, HostEvent, ListenerHandle, NodeInfo, Phase, Propagation,
    RecordingClaim,
};
pub use capture::Recorder;

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Host refused to register a {0} listener")]
    ListenerDenied(EventType),
}
