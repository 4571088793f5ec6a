// Startup errors with a distinct meaning
//
// Everything else travels as a plain anyhow::Error with context attached.
// These ride inside anyhow too and can be recovered with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootstrapError {
    /// A requested instance layer is not installed on this host.
    #[error("missing instance layer support: {0}")]
    MissingLayer(String),

    /// The queue family chosen by the device selector cannot present to the window surface.
    #[error("queue family {family} cannot present to the window surface")]
    PresentationUnsupported { family: u32 },

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("context is already initialized")]
    AlreadyInitialized,

    #[error("context is not initialized")]
    NotInitialized,
}
