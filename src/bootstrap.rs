// =============================================================================
// CONTEXT BOOTSTRAPPER
// =============================================================================
//
// Brings up, in this order and only this order:
//   1. capability lists (layers, instance/device extensions)
//   2. layer validation      - fails before anything is created
//   3. context
//   4. diagnostic channel    - only when diagnostics are enabled
//   5. device pair           - delegated to the context's selector/factory
//   6. native window
//   7. surface + format negotiation
//
// Teardown is the exact reverse, preceded by one device idle wait:
//   idle wait -> device -> surface -> window -> diagnostic channel -> context
// It is idempotent, runs from Drop, and also runs when initialization fails
// part way through.

use crate::backend::{
    Context, ContextInfo, DeviceRequirements, DeviceSelection, Loader, LogicalDevice,
    NativeWindow, DEBUG_REPORT_EXTENSION, SURFACE_EXTENSION, SWAPCHAIN_EXTENSION,
};
use crate::config::ProgramConfig;
use crate::diagnostics::{self, ConsoleSink, VALIDATION_LAYER};
use crate::error::BootstrapError;
use crate::frame::{
    Clock, FpsCounter, FrameDriver, FrameHooks, FrameRateAccumulator, FrameStats, StdClock,
};
use crate::surface::{negotiate_format, NegotiatedSurface};
use anyhow::{Context as _, Result};
use ash::vk;
use std::sync::Arc;

type Ctx<L> = <L as Loader>::Context;
type SurfaceOf<L> = <Ctx<L> as Context>::Surface;
type PhysicalOf<L> = <Ctx<L> as Context>::PhysicalDevice;
type DeviceOf<L> = <Ctx<L> as Context>::Device;
type DiagnosticsOf<L> = <Ctx<L> as Context>::Diagnostics;

/// Everything requested from the backend at creation time.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub device_extensions: Vec<String>,
    pub device_features: vk::PhysicalDeviceFeatures,
}

/// First requested layer that is not available, scanning in request order.
pub fn find_missing_layer<'a>(requested: &'a [String], available: &[String]) -> Option<&'a str> {
    requested
        .iter()
        .find(|layer| !available.contains(layer))
        .map(String::as_str)
}

/// Selected physical device and the logical device created on it.
pub struct DevicePair<P, D> {
    pub selection: DeviceSelection<P>,
    pub device: D,
}

pub struct Bootstrapper<L: Loader, W: NativeWindow> {
    config: ProgramConfig,
    loader: L,
    window: W,
    capabilities: Capabilities,
    extra_device_extensions: Vec<String>,
    extra_device_features: vk::PhysicalDeviceFeatures,
    diagnostic_sink: Arc<ConsoleSink>,

    // Created top to bottom, destroyed bottom to top
    context: Option<Ctx<L>>,
    diagnostics: Option<DiagnosticsOf<L>>,
    device: Option<DevicePair<PhysicalOf<L>, DeviceOf<L>>>,
    window_open: bool,
    surface: Option<SurfaceOf<L>>,
    surface_format: Option<vk::SurfaceFormatKHR>,
}

impl<L: Loader, W: NativeWindow> Bootstrapper<L, W> {
    /// Store configuration only; nothing is created until `initialize`.
    pub fn new(config: ProgramConfig, loader: L, window: W) -> Self {
        log::info!(
            "Bootstrapper for '{}' (diagnostics: {})",
            config.app_name,
            config.enable_diagnostics
        );
        Self {
            config,
            loader,
            window,
            capabilities: Capabilities::default(),
            extra_device_extensions: Vec::new(),
            extra_device_features: vk::PhysicalDeviceFeatures::default(),
            diagnostic_sink: Arc::new(ConsoleSink::stdio()),
            context: None,
            diagnostics: None,
            device: None,
            window_open: false,
            surface: None,
            surface_format: None,
        }
    }

    /// Route diagnostic lines somewhere other than stdout/stderr.
    pub fn with_diagnostic_sink(mut self, sink: Arc<ConsoleSink>) -> Self {
        self.diagnostic_sink = sink;
        self
    }

    /// Extra device extension a renderer needs, on top of the swapchain.
    pub fn require_device_extension(&mut self, name: impl Into<String>) {
        self.extra_device_extensions.push(name.into());
    }

    pub fn require_device_features(&mut self, features: vk::PhysicalDeviceFeatures) {
        self.extra_device_features = features;
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Bring the context up, negotiating `color_format` for the surface.
    ///
    /// On failure everything created so far is torn down before returning.
    pub fn initialize(&mut self, color_format: vk::Format) -> Result<()> {
        if self.context.is_some() {
            return Err(BootstrapError::AlreadyInitialized.into());
        }

        let result = self.initialize_steps(color_format);
        if let Err(e) = &result {
            log::error!("Initialization failed: {:#}", e);
            self.teardown();
        }
        result
    }

    fn initialize_steps(&mut self, color_format: vk::Format) -> Result<()> {
        log::info!("Initializing context...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Capability lists
        // ─────────────────────────────────────────────────────────────────────
        let display = self.window.display_handle()?;
        self.capabilities = self.assemble_capabilities(display)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Layer validation, before any context exists
        // ─────────────────────────────────────────────────────────────────────
        if let Some(missing) = self.missing_layer()? {
            return Err(BootstrapError::MissingLayer(missing).into());
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Context
        // ─────────────────────────────────────────────────────────────────────
        let context = self.context.insert(self.loader.create_context(&ContextInfo {
            app_name: self.config.app_name.clone(),
            layers: self.capabilities.layers.clone(),
            extensions: self.capabilities.instance_extensions.clone(),
        })?);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Diagnostic channel (best effort)
        // ─────────────────────────────────────────────────────────────────────
        if self.config.enable_diagnostics {
            let filter = diagnostics::report_flags(self.config.verbose_diagnostics);
            let handler = diagnostics::console_handler(self.diagnostic_sink.clone());
            match context.register_diagnostics(filter, handler)? {
                Some(token) => {
                    log::info!("Diagnostic channel registered");
                    self.diagnostics = Some(token);
                }
                None => log::warn!("Debug report entry points unavailable, continuing without diagnostics"),
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Device pair
        // ─────────────────────────────────────────────────────────────────────
        let requirements = DeviceRequirements {
            features: self.capabilities.device_features,
            extensions: self.capabilities.device_extensions.clone(),
            display,
        };
        let selection = context.select_device(&requirements)?;
        let device = context.create_device(&selection, &requirements)?;
        let device = self.device.insert(DevicePair { selection, device });

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Native window
        // ─────────────────────────────────────────────────────────────────────
        self.window.open().context("Failed to open window")?;
        self.window_open = true;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Surface
        // ─────────────────────────────────────────────────────────────────────
        let surface = *self
            .surface
            .insert(context.create_surface(display, self.window.window_handle()?)?);

        let physical = device.selection.physical;
        let family = device.selection.present_queue_family;
        if !context.surface_support(physical, family, surface)? {
            return Err(BootstrapError::PresentationUnsupported { family }.into());
        }

        let supported = context.surface_formats(physical, surface)?;
        let format = negotiate_format(&supported, color_format)?;
        self.surface_format = Some(format);

        log::info!(
            "Surface format: {:?} / {:?} (requested {:?})",
            format.format,
            format.color_space,
            color_format
        );
        log::info!("Context initialized successfully!");
        Ok(())
    }

    fn assemble_capabilities(
        &self,
        display: raw_window_handle::RawDisplayHandle,
    ) -> Result<Capabilities> {
        let mut instance_extensions = vec![SURFACE_EXTENSION.to_string()];
        instance_extensions.extend(self.loader.surface_extensions(display)?);

        let mut device_extensions = vec![SWAPCHAIN_EXTENSION.to_string()];
        device_extensions.extend(self.extra_device_extensions.iter().cloned());

        if self.config.enable_diagnostics {
            instance_extensions.push(DEBUG_REPORT_EXTENSION.to_string());
        }

        Ok(Capabilities {
            layers: self.requested_layers(),
            instance_extensions,
            device_extensions,
            device_features: self.extra_device_features,
        })
    }

    /// Layers the context will be created with. Fixed by the configuration.
    pub fn requested_layers(&self) -> Vec<String> {
        if self.config.enable_diagnostics {
            vec![VALIDATION_LAYER.to_string()]
        } else {
            Vec::new()
        }
    }

    /// True when every requested layer is installed. Query only, valid before `initialize`.
    pub fn validate_layers(&self) -> Result<bool> {
        Ok(self.missing_layer()?.is_none())
    }

    fn missing_layer(&self) -> Result<Option<String>> {
        let requested = self.requested_layers();
        if requested.is_empty() {
            return Ok(None);
        }

        let available = self.loader.available_layers()?;
        let missing = find_missing_layer(&requested, &available);
        if let Some(layer) = missing {
            log::error!("{} not supported", layer);
        }
        Ok(missing.map(str::to_string))
    }

    // =========================================================================
    // FRAME LOOP
    // =========================================================================

    /// Run the frame loop with the system clock until the window quits.
    pub fn run<H: FrameHooks + ?Sized>(&mut self, hooks: &mut H) -> Result<FrameStats> {
        let mut driver = FrameDriver::new(StdClock::new(), FpsCounter::new(self.config.show_fps));
        self.run_with(&mut driver, hooks)
    }

    /// Run the frame loop with a caller-supplied driver.
    pub fn run_with<C, F, H>(
        &mut self,
        driver: &mut FrameDriver<C, F>,
        hooks: &mut H,
    ) -> Result<FrameStats>
    where
        C: Clock,
        F: FrameRateAccumulator,
        H: FrameHooks + ?Sized,
    {
        if self.surface_format.is_none() {
            return Err(BootstrapError::NotInitialized.into());
        }
        driver.run(&mut self.window, hooks)
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Destroy everything in reverse creation order. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.context.is_none() && !self.window_open {
            return;
        }
        log::info!("Tearing down context...");

        // Wait for the GPU before destroying anything
        if let Some(pair) = &self.device {
            if let Err(e) = pair.device.wait_idle() {
                log::error!("Device idle wait failed: {:#}", e);
            }
        }

        // 1. Device pair
        drop(self.device.take());

        // 2. Surface
        self.surface_format = None;
        if let (Some(surface), Some(context)) = (self.surface.take(), &self.context) {
            context.destroy_surface(surface);
        }

        // 3. Window
        if self.window_open {
            self.window.close();
            self.window_open = false;
        }

        // 4. Diagnostic channel
        if let (Some(token), Some(context)) = (self.diagnostics.take(), &self.context) {
            context.unregister_diagnostics(token);
            self.diagnostic_sink.log_summary();
        }

        // 5. Context
        drop(self.context.take());

        log::info!("Teardown complete");
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn is_initialized(&self) -> bool {
        self.surface_format.is_some()
    }

    pub fn diagnostics_registered(&self) -> bool {
        self.diagnostics.is_some()
    }

    pub fn context(&self) -> Option<&Ctx<L>> {
        self.context.as_ref()
    }

    pub fn device(&self) -> Option<&DevicePair<PhysicalOf<L>, DeviceOf<L>>> {
        self.device.as_ref()
    }

    pub fn surface(&self) -> Option<NegotiatedSurface<SurfaceOf<L>>> {
        Some(NegotiatedSurface {
            handle: self.surface?,
            format: self.surface_format?,
        })
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    pub fn diagnostic_sink(&self) -> &Arc<ConsoleSink> {
        &self.diagnostic_sink
    }
}

impl<L: Loader, W: NativeWindow> Drop for Bootstrapper<L, W> {
    fn drop(&mut self) {
        self.teardown();
    }
}
