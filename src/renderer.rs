// =============================================================================
// CLEAR RENDERER - a concrete set of frame hooks
// =============================================================================
//
// acquire_back_buffer: wait for the frame slot's fence, acquire a swapchain image
// present_back_buffer: record a clear to an animated colour, submit, present
//
// The swapchain is recreated whenever acquire/present report it out of date
// or suboptimal, and when the window's drawable size changes. Must be dropped before the bootstrapper tears down.

use crate::backend::swapchain::{choose_extent, SwapchainTarget, COLOR_RANGE};
use crate::backend::{Swapchain, VulkanContext, VulkanDevice};
use crate::frame::FrameHooks;
use crate::surface::NegotiatedSurface;
use crate::window::DrawableSize;
use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use glam::Vec4;

pub struct RendererSettings {
    pub clear_color: [f32; 4],
    pub present_mode: vk::PresentModeKHR,
    pub max_frames_in_flight: usize,
}

pub struct ClearRenderer {
    instance: ash::Instance,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    clear_color: Vec4,
    /// Window size, used when the surface leaves the extent to us
    size: DrawableSize,
    /// Window size the current swapchain was built for
    built_for: (u32, u32),

    swapchain: Option<Swapchain>,
    command_pool: vk::CommandPool,
    frames: Vec<FrameSlot>,
    current_frame: usize,
    /// Signalled by the submit, waited on by the present. One per swapchain
    /// image: a present can still hold it after the frame slot comes round.
    render_finished: Vec<vk::Semaphore>,

    /// Image acquired this frame; None when the frame is skipped
    image_index: Option<u32>,
    needs_recreate: bool,
}

impl ClearRenderer {
    pub fn new(
        context: &VulkanContext,
        device: &VulkanDevice,
        surface: NegotiatedSurface<vk::SurfaceKHR>,
        size: DrawableSize,
        settings: &RendererSettings,
    ) -> Result<Self> {
        let frames_in_flight = settings.max_frames_in_flight.max(1);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_family)
            // TRANSIENT: Command buffers are short-lived
            // RESET: Allow individual buffer reset
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        let frames = command_buffers
            .into_iter()
            .map(|cmd| FrameSlot::new(&device.device, cmd))
            .collect::<Result<Vec<_>>>()?;

        let mut renderer = Self {
            instance: context.instance.clone(),
            device: device.device.clone(),
            physical_device: device.physical_device,
            queue: device.queue,
            surface_loader: context.surface_loader.clone(),
            surface: surface.handle,
            format: surface.format,
            present_mode: settings.present_mode,
            clear_color: Vec4::from(settings.clear_color),
            built_for: size.get(),
            size,
            swapchain: None,
            command_pool,
            frames,
            current_frame: 0,
            render_finished: Vec::new(),
            image_index: None,
            needs_recreate: true,
        };
        renderer.recreate_swapchain()?;

        Ok(renderer)
    }

    /// Rebuild the swapchain for the surface's current extent.
    ///
    /// A zero-sized surface (minimized window) leaves the flag set and skips frames.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .context("Failed to query surface capabilities")?;

        let (width, height) = self.size.get();
        self.built_for = (width, height);
        let extent = choose_extent(&caps, width, height);
        if extent.width == 0 || extent.height == 0 {
            return Ok(());
        }

        unsafe { self.device.device_wait_idle() }?;

        let target = SwapchainTarget {
            instance: &self.instance,
            device: &self.device,
            physical_device: self.physical_device,
            surface_loader: &self.surface_loader,
            surface: self.surface,
            format: self.format,
        };

        let old = self.swapchain.take();
        let swapchain = Swapchain::new(
            &target,
            self.present_mode,
            extent.width,
            extent.height,
            old.as_ref(),
        )?;
        drop(old);

        let device = &self.device;
        fit_pool(
            &mut self.render_finished,
            swapchain.images.len(),
            || unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .context("Failed to create semaphore"),
            |semaphore| unsafe { device.destroy_semaphore(semaphore, None) },
        )?;

        self.swapchain = Some(swapchain);
        self.needs_recreate = false;
        Ok(())
    }

    fn record_clear(&self, cmd: vk::CommandBuffer, image: vk::Image, color: Vec4) -> Result<()> {
        let clear_color = vk::ClearColorValue {
            float32: color.to_array(),
        };

        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(cmd, &begin_info)?;

            // UNDEFINED -> TRANSFER_DST so the image can be cleared
            let barrier_to_transfer = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE)
                .build();

            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier_to_transfer],
            );

            self.device.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_color,
                &[COLOR_RANGE],
            );

            // TRANSFER_DST -> PRESENT_SRC for presentation
            let barrier_to_present = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE)
                .build();

            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier_to_present],
            );

            self.device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

/// Per frame in flight: its command buffer, the acquire semaphore and the
/// fence the CPU waits on before reusing the slot.
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSlot {
    fn new(device: &ash::Device, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on a fresh slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                command_buffer,
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create semaphore")?,
                in_flight: device
                    .create_fence(&fence_info, None)
                    .context("Failed to create fence")?,
            })
        }
    }

    /// The command buffer goes with the pool.
    unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_fence(self.in_flight, None);
    }
}

/// Grow or shrink `pool` to `count` entries, creating and destroying at the tail.
fn fit_pool<T>(
    pool: &mut Vec<T>,
    count: usize,
    mut create: impl FnMut() -> Result<T>,
    mut destroy: impl FnMut(T),
) -> Result<()> {
    while pool.len() > count {
        if let Some(item) = pool.pop() {
            destroy(item);
        }
    }
    while pool.len() < count {
        pool.push(create()?);
    }
    Ok(())
}

/// Drift from the configured colour towards its rotated channels and back.
pub fn animated_color(base: Vec4, elapsed: f64) -> Vec4 {
    let t = (elapsed.sin() * 0.5 + 0.5) as f32;
    let rotated = Vec4::new(base.z, base.x, base.y, base.w);
    base.lerp(rotated, t)
}

impl FrameHooks for ClearRenderer {
    fn acquire_back_buffer(&mut self) -> Result<()> {
        self.image_index = None;

        if self.size.get() != self.built_for {
            self.needs_recreate = true;
        }
        if self.needs_recreate {
            self.recreate_swapchain()?;
        }
        let Some(swapchain) = self.swapchain.as_ref().filter(|_| !self.needs_recreate) else {
            return Ok(());
        };

        let slot = &self.frames[self.current_frame];

        // Wait for the frame that last used this slot
        unsafe {
            self.device.wait_for_fences(&[slot.in_flight], true, u64::MAX)?;
        }

        match swapchain.acquire_next_image(u64::MAX, slot.image_available)? {
            Some((index, suboptimal)) => {
                self.needs_recreate |= suboptimal;
                self.image_index = Some(index);
            }
            None => self.needs_recreate = true,
        }

        Ok(())
    }

    fn present_back_buffer(&mut self, elapsed: f64, _delta: f64) -> Result<()> {
        let Some(image_index) = self.image_index.take() else {
            return Ok(());
        };
        let swapchain = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?;

        let slot = &self.frames[self.current_frame];
        let cmd = slot.command_buffer;
        let image = swapchain.images[image_index as usize];

        self.record_clear(cmd, image, animated_color(self.clear_color, elapsed))?;

        let wait_semaphores = [slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [self.render_finished[image_index as usize]];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.reset_fences(&[slot.in_flight])?;
            self.device
                .queue_submit(self.queue, &[submit_info.build()], slot.in_flight)
                .context("Failed to submit frame")?;
        }

        let recreate = swapchain.present(self.queue, image_index, &signal_semaphores)?;
        self.needs_recreate |= recreate;

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(())
    }
}

impl Drop for ClearRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer resources...");

        // Wait for GPU to finish before destroying anything
        let _ = unsafe { self.device.device_wait_idle() };

        unsafe {
            for slot in &self.frames {
                slot.destroy(&self.device);
            }
            for &semaphore in &self.render_finished {
                self.device.destroy_semaphore(semaphore, None);
            }
            // Also frees the command buffers
            self.device.destroy_command_pool(self.command_pool, None);
        }

        self.swapchain = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_starts_halfway() {
        let base = Vec4::new(1.0, 0.0, 0.0, 1.0);
        // sin(0) = 0 -> halfway between base and rotated (0, 1, 0, 1)
        let color = animated_color(base, 0.0);
        assert!(color.abs_diff_eq(Vec4::new(0.5, 0.5, 0.0, 1.0), 1e-6));
    }

    /// Numbers entries as they are created and records the destroyed ones.
    fn fit(pool: &mut Vec<u32>, count: usize, next: &mut u32, destroyed: &mut Vec<u32>) {
        fit_pool(
            pool,
            count,
            || {
                *next += 1;
                Ok(*next)
            },
            |item| destroyed.push(item),
        )
        .unwrap();
    }

    #[test]
    fn pool_follows_image_count() {
        let (mut next, mut destroyed, mut pool) = (0, Vec::new(), Vec::new());

        fit(&mut pool, 3, &mut next, &mut destroyed);
        assert_eq!(pool, vec![1, 2, 3]);

        // Same count keeps every entry
        fit(&mut pool, 3, &mut next, &mut destroyed);
        assert_eq!(pool, vec![1, 2, 3]);

        fit(&mut pool, 2, &mut next, &mut destroyed);
        assert_eq!(pool, vec![1, 2]);
        assert_eq!(destroyed, vec![3]);

        fit(&mut pool, 4, &mut next, &mut destroyed);
        assert_eq!(pool, vec![1, 2, 4, 5]);
    }

    #[test]
    fn pool_stops_at_first_creation_error() {
        let mut pool = vec![1];
        let mut created = 0;
        let result = fit_pool(
            &mut pool,
            3,
            || {
                created += 1;
                anyhow::ensure!(created < 2, "out of semaphores");
                Ok(10 + created)
            },
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(pool, vec![1, 11]);
    }

    #[test]
    fn animation_keeps_alpha() {
        let base = Vec4::new(0.1, 0.2, 0.8, 0.75);
        for step in 0..20 {
            let color = animated_color(base, step as f64 * 0.37);
            assert!((color.w - 0.75).abs() < 1e-6);
        }
    }
}
