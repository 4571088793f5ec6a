// =============================================================================
// VULKAN PROGRAM BASE
// =============================================================================
//
// Brings a Vulkan context up against a native window, then drives a frame
// loop that hands acquire/present work to a renderer.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Bootstrapper (owns everything below, tears down in reverse)    │
// │    ├── Context            - instance + enabled layers/exts      │
// │    ├── Diagnostic channel - optional debug report callback      │
// │    ├── Device pair        - delegated selection + creation      │
// │    ├── Native window      - winit, pumped without blocking      │
// │    └── Surface            - negotiated colour format            │
// │  FrameDriver                                                    │
// │    └── FrameHooks         - acquire/present, e.g. ClearRenderer │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod renderer;
pub mod surface;
pub mod window;

pub use bootstrap::{Bootstrapper, Capabilities, DevicePair};
pub use config::{Config, ProgramConfig};
pub use error::BootstrapError;
pub use frame::{FrameDriver, FrameHooks, FrameStats};
pub use surface::NegotiatedSurface;
