//! Contract of the interactive surface hosting an agent's content.

use std::{fmt, path::PathBuf, sync::Arc};

use bytes::Bytes;
use tokio::sync::watch;

use crate::ThemeSource;

/// Callbacks a surface invokes on the session that owns it.
pub trait SurfaceCallbacks: Send + Sync {
    /// The user dismissed the surface. Called once.
    fn close(&self);

    /// The surface submitted data.
    fn send_data(&self, data: Bytes);

    /// A navigation to `uri` is about to happen. Returns `true` when the
    /// navigation was handled locally and must not proceed.
    fn handle_local_uri(&self, uri: &str) -> bool;
}

/// Everything a host needs to present a surface.
pub struct SurfaceParams {
    pub url: String,
    /// Directory for the surface's persistent storage.
    pub storage_path: PathBuf,
    /// Title, updated when the agent is renamed.
    pub title: watch::Receiver<String>,
    pub subtitle: String,
    pub callbacks: Arc<dyn SurfaceCallbacks>,
    pub theme: Arc<dyn ThemeSource>,
}

impl fmt::Debug for SurfaceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceParams")
            .field("url", &self.url)
            .field("storage_path", &self.storage_path)
            .field("title", &*self.title.borrow())
            .field("subtitle", &self.subtitle)
            .finish_non_exhaustive()
    }
}

/// A presented surface. Dropping it dismisses the surface.
pub trait Surface: Send {
    /// Bring the surface to the front.
    fn request_activate(&self);
}

/// Creates surfaces.
pub trait SurfaceHost: Send + Sync {
    fn show(&self, params: SurfaceParams) -> Box<dyn Surface>;
}
