// Backend module - collaborator interfaces and their Vulkan implementation
//
// The bootstrapper is written against these traits. `vulkan` and `device`
// implement them on top of ash; tests implement them with recording mocks.

pub mod device;
pub mod swapchain;
pub mod vulkan;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
pub use vulkan::{VulkanContext, VulkanLoader};

use crate::diagnostics::DiagnosticHandler;
use anyhow::Result;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Instance-level switch for the surface machinery, always requested.
pub const SURFACE_EXTENSION: &str = "VK_KHR_surface";
/// Device-level switch for presentation swapchains, always requested.
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";
/// Instance extension carrying the debug report entry points.
pub const DEBUG_REPORT_EXTENSION: &str = "VK_EXT_debug_report";

/// What the context is created with. Fixed for the context's lifetime.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub app_name: String,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

/// What the device selector must satisfy.
#[derive(Clone)]
pub struct DeviceRequirements {
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    /// Display connection the chosen queue family must be able to present to.
    pub display: RawDisplayHandle,
}

/// A physical device plus the queue family that will present.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSelection<P> {
    pub physical: P,
    pub present_queue_family: u32,
}

/// Entry point into the backend, usable before any context exists.
pub trait Loader {
    type Context: Context;

    /// Names of the instance layers installed on this host.
    fn available_layers(&self) -> Result<Vec<String>>;

    /// Platform surface extensions needed for windows on `display`.
    fn surface_extensions(&self, display: RawDisplayHandle) -> Result<Vec<String>>;

    fn create_context(&self, info: &ContextInfo) -> Result<Self::Context>;
}

/// A live context. Dropping it destroys it.
pub trait Context {
    /// Registration token of the diagnostic channel.
    type Diagnostics;
    type Surface: Copy;
    type PhysicalDevice: Copy;
    type Device: LogicalDevice;

    /// Register `handler` for reports matching `filter`.
    ///
    /// `Ok(None)` when the backend does not expose the registration entry point.
    fn register_diagnostics(
        &self,
        filter: vk::DebugReportFlagsEXT,
        handler: DiagnosticHandler,
    ) -> Result<Option<Self::Diagnostics>>;

    /// No-op when the unregistration entry point is missing.
    fn unregister_diagnostics(&self, token: Self::Diagnostics);

    /// Device selector: fails when no device qualifies.
    fn select_device(
        &self,
        requirements: &DeviceRequirements,
    ) -> Result<DeviceSelection<Self::PhysicalDevice>>;

    /// Logical device factory.
    fn create_device(
        &self,
        selection: &DeviceSelection<Self::PhysicalDevice>,
        requirements: &DeviceRequirements,
    ) -> Result<Self::Device>;

    fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self::Surface>;

    fn surface_support(
        &self,
        physical: Self::PhysicalDevice,
        queue_family: u32,
        surface: Self::Surface,
    ) -> Result<bool>;

    fn surface_formats(
        &self,
        physical: Self::PhysicalDevice,
        surface: Self::Surface,
    ) -> Result<Vec<vk::SurfaceFormatKHR>>;

    fn destroy_surface(&self, surface: Self::Surface);
}

/// Logical device and its queues. Dropping it releases it.
pub trait LogicalDevice {
    /// Block until all submitted work has completed.
    fn wait_idle(&self) -> Result<()>;
}

/// Result of draining the pending window events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Continue,
    Quit,
}

/// Non-blocking source of window/input events.
pub trait EventPump {
    /// Drain everything pending without waiting. Events queued after a quit are discarded.
    fn pump_events(&mut self) -> PumpStatus;
}

/// The native window the context presents into.
pub trait NativeWindow: EventPump {
    fn open(&mut self) -> Result<()>;

    fn close(&mut self);

    /// Available before `open`; needed to pick surface extensions.
    fn display_handle(&self) -> Result<RawDisplayHandle>;

    fn window_handle(&self) -> Result<RawWindowHandle>;

    /// Drawable size in physical pixels.
    fn inner_size(&self) -> (u32, u32);
}
