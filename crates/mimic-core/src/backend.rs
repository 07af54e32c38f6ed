use async_trait::async_trait;
pub use mimic_common::error::BackendError;
use mimic_common::protocol::{Point, SyntheticEvent, UiSnapshot, WindowInfo};

/// The Backend trait is the interface every UI host adapter implements.
///
/// Replay never touches a live UI directly: element lookup goes through
/// [`Backend::snapshot`] and [`Backend::query_selector`], input goes through
/// [`Backend::dispatch`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Attach to the host UI.
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Detach and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept events.
    async fn is_ready(&self) -> bool;

    /// Capture the currently rendered UI tree.
    async fn snapshot(&mut self) -> Result<UiSnapshot, BackendError>;

    /// Run a structural selector against the live tree and return the matching element id.
    async fn query_selector(&mut self, _selector: &str) -> Result<Option<u32>, BackendError> {
        Err(BackendError::NotSupported("query_selector".into()))
    }

    /// Deliver one synthetic input event to the host.
    async fn dispatch(&mut self, event: SyntheticEvent) -> Result<(), BackendError>;

    /// Move keyboard focus to an element.
    async fn focus(&mut self, id: u32) -> Result<(), BackendError>;

    /// Element that currently owns keyboard focus, if any.
    async fn active_element(&mut self) -> Result<Option<u32>, BackendError> {
        Ok(None)
    }

    /// Window manager reachable through this backend, if the host exposes one.
    fn window_manager(&mut self) -> Option<&mut dyn WindowManager> {
        None
    }
}

/// Host window lifecycle, addressed by window id.
#[async_trait]
pub trait WindowManager: Send + Sync {
    async fn open_app(&mut self, app_id: &str) -> Result<WindowInfo, BackendError>;

    async fn close_window(&mut self, id: &str) -> Result<(), BackendError>;

    async fn focus_window(&mut self, id: &str) -> Result<(), BackendError>;

    async fn move_window(&mut self, id: &str, to: Point) -> Result<(), BackendError>;

    async fn list_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }
}
