// Vulkan Device - physical device selection and logical device creation
//
// Responsibilities:
// - Physical device selection (features, extensions, presenting queue family)
// - Logical device + queue creation
// - Idle wait before teardown

use super::{DeviceRequirements, DeviceSelection, LogicalDevice};
use super::vulkan::to_cstrings;
use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::collections::HashSet;
use std::ffi::{c_char, CStr};

/// Pick the best device that satisfies `requirements`.
///
/// Discrete GPUs beat integrated ones, which beat everything else.
pub fn select_physical_device(
    entry: &Entry,
    instance: &ash::Instance,
    requirements: &DeviceRequirements,
) -> Result<DeviceSelection<vk::PhysicalDevice>> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .context("Failed to enumerate physical devices")?;

    if devices.is_empty() {
        anyhow::bail!("No Vulkan-capable GPU found");
    }

    // Score each device
    let mut best = None;
    let mut best_score = 0;

    for device in devices {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        let features = unsafe { instance.get_physical_device_features(device) };
        if !features_satisfied(&requirements.features, &features) {
            log::debug!("{}: missing required features", name);
            continue;
        }

        if !extensions_supported(instance, device, &requirements.extensions)? {
            log::debug!("{}: missing required extensions", name);
            continue;
        }

        let Some(family) = present_queue_family(entry, instance, device, requirements.display)
        else {
            log::debug!("{}: no queue family can present", name);
            continue;
        };

        let score = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };

        if score > best_score {
            best_score = score;
            best = Some(DeviceSelection {
                physical: device,
                present_queue_family: family,
            });
        }
    }

    best.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
}

/// Every feature set in `required` is also set in `available`.
pub fn features_satisfied(
    required: &vk::PhysicalDeviceFeatures,
    available: &vk::PhysicalDeviceFeatures,
) -> bool {
    // PhysicalDeviceFeatures is a plain run of Bool32 fields
    fn as_slice(features: &vk::PhysicalDeviceFeatures) -> &[vk::Bool32] {
        const COUNT: usize = std::mem::size_of::<vk::PhysicalDeviceFeatures>()
            / std::mem::size_of::<vk::Bool32>();
        unsafe { std::slice::from_raw_parts(features as *const _ as *const vk::Bool32, COUNT) }
    }

    as_slice(required)
        .iter()
        .zip(as_slice(available))
        .all(|(&req, &avail)| req == vk::FALSE || avail == vk::TRUE)
}

fn extensions_supported(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    required: &[String],
) -> Result<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(device) }
        .context("Failed to enumerate device extensions")?;

    let available: HashSet<String> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
            .to_string_lossy()
            .into_owned())
        .collect();

    Ok(required.iter().all(|name| available.contains(name)))
}

/// First graphics queue family that can present to `display`.
///
/// Xlib/XCB presentation needs a visual that only exists once the window is
/// open, so there the surface support check at negotiation is authoritative.
fn present_queue_family(
    entry: &Entry,
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    display: RawDisplayHandle,
) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    families
        .iter()
        .enumerate()
        .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, _)| index as u32)
        .find(|&index| unsafe { can_present(entry, instance, device, index, display) })
}

unsafe fn can_present(
    entry: &Entry,
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    family: u32,
    display: RawDisplayHandle,
) -> bool {
    match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::new(entry, instance)
            .get_physical_device_win32_presentation_support(device, family),
        RawDisplayHandle::Wayland(handle) => khr::WaylandSurface::new(entry, instance)
            .get_physical_device_wayland_presentation_support(
                device,
                family,
                &mut *(handle.display.as_ptr() as *mut vk::wl_display),
            ),
        _ => true,
    }
}

/// Logical device with its presenting queue
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family: u32,
}

impl VulkanDevice {
    pub fn new(
        instance: &ash::Instance,
        selection: &DeviceSelection<vk::PhysicalDevice>,
        requirements: &DeviceRequirements,
    ) -> Result<Self> {
        let physical_device = selection.physical;
        let queue_family = selection.present_queue_family;

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = to_cstrings(&requirements.extensions)?;
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|s| s.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&requirements.features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Self {
            device,
            physical_device,
            queue,
            queue_family,
        })
    }
}

impl LogicalDevice for VulkanDevice {
    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        unsafe { self.device.destroy_device(None) };
    }
}
