// Vulkan context - instance, layers, debug reports, window surfaces
//
// Responsibilities:
// - Enumerate instance layers before anything is created
// - Instance creation with the assembled layer/extension lists
// - Debug report callback registration (only if the entry points exist)
// - Platform surface creation from raw window handles

use super::{
    device, Context, ContextInfo, DeviceRequirements, DeviceSelection, Loader, VulkanDevice,
};
use crate::diagnostics::{DiagnosticHandler, DiagnosticReport};
use anyhow::{Context as _, Result};
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Loaded Vulkan library
pub struct VulkanLoader {
    entry: Entry,
}

impl VulkanLoader {
    pub fn load() -> Result<Self> {
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;
        Ok(Self { entry })
    }
}

impl Loader for VulkanLoader {
    type Context = VulkanContext;

    fn available_layers(&self) -> Result<Vec<String>> {
        let layers = self
            .entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;

        Ok(layers
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
                .to_string_lossy()
                .into_owned())
            .collect())
    }

    fn surface_extensions(&self, display: RawDisplayHandle) -> Result<Vec<String>> {
        let name = match display {
            RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
            RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
            RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
            RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
            other => anyhow::bail!("Unsupported display handle: {:?}", other),
        };
        Ok(vec![name.to_string_lossy().into_owned()])
    }

    fn create_context(&self, info: &ContextInfo) -> Result<VulkanContext> {
        let app_name = CString::new(info.app_name.as_str())?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(1)
            .engine_name(&app_name)
            .engine_version(1)
            .api_version(vk::API_VERSION_1_0);

        let layers = to_cstrings(&info.layers)?;
        let extensions = to_cstrings(&info.extensions)?;
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|s| s.as_ptr()).collect();
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|s| s.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        log::info!(
            "Created Vulkan instance (layers: {:?}, extensions: {:?})",
            info.layers,
            info.extensions
        );

        Ok(VulkanContext {
            surface_loader: khr::Surface::new(&self.entry, &instance),
            entry: self.entry.clone(),
            instance,
            layers: info.layers.clone(),
            extensions: info.extensions.clone(),
        })
    }
}

pub(crate) fn to_cstrings(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| CString::new(name.as_str()).with_context(|| format!("Invalid name: {name}")))
        .collect()
}

/// Vulkan instance with the surface loader bound to it
pub struct VulkanContext {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: khr::Surface,
    layers: Vec<String>,
    extensions: Vec<String>,
}

impl VulkanContext {
    pub fn enabled_layers(&self) -> &[String] {
        &self.layers
    }

    pub fn enabled_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn has_instance_fn(&self, name: &CStr) -> bool {
        unsafe {
            self.entry
                .get_instance_proc_addr(self.instance.handle(), name.as_ptr())
                .is_some()
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe { self.instance.destroy_instance(None) };
    }
}

/// Registered debug report callback.
///
/// Owns the handler the driver holds a pointer to, so it must outlive the registration.
#[allow(deprecated)]
pub struct DebugReportRegistration {
    loader: ext::DebugReport,
    callback: vk::DebugReportCallbackEXT,
    handler: Box<DiagnosticHandler>,
}

#[allow(deprecated)]
impl Context for VulkanContext {
    type Diagnostics = DebugReportRegistration;
    type Surface = vk::SurfaceKHR;
    type PhysicalDevice = vk::PhysicalDevice;
    type Device = VulkanDevice;

    fn register_diagnostics(
        &self,
        filter: vk::DebugReportFlagsEXT,
        handler: DiagnosticHandler,
    ) -> Result<Option<DebugReportRegistration>> {
        if !self.has_instance_fn(c"vkCreateDebugReportCallbackEXT") {
            return Ok(None);
        }

        let loader = ext::DebugReport::new(&self.entry, &self.instance);
        let handler = Box::new(handler);
        let user_data = &*handler as *const DiagnosticHandler as *mut c_void;

        let create_info = vk::DebugReportCallbackCreateInfoEXT::builder()
            .flags(filter)
            .pfn_callback(Some(debug_report_callback))
            .user_data(user_data);

        let callback = unsafe { loader.create_debug_report_callback(&create_info, None) }
            .context("Failed to register debug report callback")?;

        Ok(Some(DebugReportRegistration {
            loader,
            callback,
            handler,
        }))
    }

    fn unregister_diagnostics(&self, token: DebugReportRegistration) {
        if !self.has_instance_fn(c"vkDestroyDebugReportCallbackEXT") {
            // The driver may still call back into the handler.
            std::mem::forget(token.handler);
            return;
        }
        unsafe {
            token
                .loader
                .destroy_debug_report_callback(token.callback, None);
        }
    }

    fn select_device(
        &self,
        requirements: &DeviceRequirements,
    ) -> Result<DeviceSelection<vk::PhysicalDevice>> {
        device::select_physical_device(&self.entry, &self.instance, requirements)
    }

    fn create_device(
        &self,
        selection: &DeviceSelection<vk::PhysicalDevice>,
        requirements: &DeviceRequirements,
    ) -> Result<VulkanDevice> {
        VulkanDevice::new(&self.instance, selection, requirements)
    }

    fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<vk::SurfaceKHR> {
        let surface = unsafe {
            match (display, window) {
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                    let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
                    let hwnd = handle.hwnd.get() as *const c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    khr::Win32Surface::new(&self.entry, &self.instance)
                        .create_win32_surface(&create_info, None)
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                    let dpy = display
                        .display
                        .context("Xlib display handle has no connection")?
                        .as_ptr();
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy as *mut _)
                        .window(handle.window);
                    khr::XlibSurface::new(&self.entry, &self.instance)
                        .create_xlib_surface(&create_info, None)
                }
                (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
                    let connection = display
                        .connection
                        .context("XCB display handle has no connection")?
                        .as_ptr();
                    let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection as *mut _)
                        .window(handle.window.get());
                    khr::XcbSurface::new(&self.entry, &self.instance)
                        .create_xcb_surface(&create_info, None)
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr() as *mut _)
                        .surface(handle.surface.as_ptr() as *mut _);
                    khr::WaylandSurface::new(&self.entry, &self.instance)
                        .create_wayland_surface(&create_info, None)
                }
                _ => anyhow::bail!("Unsupported window handle type"),
            }
        }
        .context("Failed to create window surface")?;

        Ok(surface)
    }

    fn surface_support(
        &self,
        physical: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical, queue_family, surface)
        }
        .context("Failed to query surface support")
    }

    fn surface_formats(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical, surface)
        }
        .context("Failed to query surface formats")
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }
}

// Driver-facing trampoline into the registered handler
unsafe extern "system" fn debug_report_callback(
    flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    _location: usize,
    message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_user_data.is_null() {
        return vk::FALSE;
    }
    let handler = &*(p_user_data as *const DiagnosticHandler);

    let layer = lossy(p_layer_prefix);
    let message = lossy(p_message);
    let report = DiagnosticReport {
        flags,
        layer: &layer,
        code: message_code,
        message: &message,
    };

    if handler(&report) {
        vk::TRUE
    } else {
        vk::FALSE
    }
}

unsafe fn lossy<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}
