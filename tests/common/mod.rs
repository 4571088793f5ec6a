// Recording collaborators for driving the bootstrapper and frame loop
// without a GPU or a display.

#![allow(dead_code)]

use anyhow::Result;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle, WebDisplayHandle, WebWindowHandle};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use vk_base::backend::{
    Context, ContextInfo, DeviceRequirements, DeviceSelection, EventPump, Loader, LogicalDevice,
    NativeWindow, PumpStatus,
};
use vk_base::diagnostics::{DiagnosticHandler, DiagnosticReport};
use vk_base::frame::{Clock, FrameHooks, FrameRateAccumulator};

pub const MOCK_SURFACE_EXTENSION: &str = "VK_KHR_mock_surface";
pub const PHYSICAL_DEVICE: u32 = 7;
pub const PRESENT_FAMILY: u32 = 2;
pub const SURFACE: u64 = 0xD15B1A7;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CreateContext,
    RegisterDiagnostics,
    SelectDevice,
    CreateDevice,
    OpenWindow,
    CreateSurface,
    WaitIdle,
    ReleaseDevice,
    DestroySurface,
    CloseWindow,
    UnregisterDiagnostics,
    DestroyContext,
    Pump,
    Acquire,
    ClockRead,
    Present { elapsed: f64, delta: f64 },
}

pub type OpLog = Rc<RefCell<Vec<Op>>>;

pub fn ops(log: &OpLog) -> Vec<Op> {
    log.borrow().clone()
}

/// Ops recorded from `from` onwards.
pub fn ops_since(log: &OpLog, from: usize) -> Vec<Op> {
    log.borrow()[from..].to_vec()
}

/// How the mock backend behaves
#[derive(Clone)]
pub struct Script {
    pub available_layers: Vec<String>,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_supported: bool,
    pub diagnostics_entry_points: bool,
    pub device_available: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            available_layers: vec![vk_base::diagnostics::VALIDATION_LAYER.to_string()],
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_supported: true,
            diagnostics_entry_points: true,
            device_available: true,
        }
    }
}

/// State shared between the loader, the context it creates and the test
#[derive(Clone)]
pub struct Shared {
    pub log: OpLog,
    pub script: Rc<Script>,
    pub context_info: Rc<RefCell<Option<ContextInfo>>>,
    pub handler: Rc<RefCell<Option<DiagnosticHandler>>>,
    pub filter: Rc<Cell<vk::DebugReportFlagsEXT>>,
    pub device_requirements: Rc<RefCell<Option<Vec<String>>>>,
}

impl Shared {
    pub fn new(log: OpLog, script: Script) -> Self {
        Self {
            log,
            script: Rc::new(script),
            context_info: Rc::default(),
            handler: Rc::default(),
            filter: Rc::new(Cell::new(vk::DebugReportFlagsEXT::empty())),
            device_requirements: Rc::default(),
        }
    }

    fn push(&self, op: Op) {
        self.log.borrow_mut().push(op);
    }

    /// Deliver a report through the registered handler, as the driver would.
    pub fn fire(&self, report: &DiagnosticReport<'_>) -> Option<bool> {
        self.handler.borrow().as_ref().map(|handler| handler(report))
    }
}

pub struct MockLoader {
    pub shared: Shared,
}

impl Loader for MockLoader {
    type Context = MockContext;

    fn available_layers(&self) -> Result<Vec<String>> {
        Ok(self.shared.script.available_layers.clone())
    }

    fn surface_extensions(&self, _display: RawDisplayHandle) -> Result<Vec<String>> {
        Ok(vec![MOCK_SURFACE_EXTENSION.to_string()])
    }

    fn create_context(&self, info: &ContextInfo) -> Result<MockContext> {
        self.shared.push(Op::CreateContext);
        *self.shared.context_info.borrow_mut() = Some(info.clone());
        Ok(MockContext {
            shared: self.shared.clone(),
        })
    }
}

pub struct MockContext {
    shared: Shared,
}

pub struct MockRegistration;

impl Context for MockContext {
    type Diagnostics = MockRegistration;
    type Surface = u64;
    type PhysicalDevice = u32;
    type Device = MockDevice;

    fn register_diagnostics(
        &self,
        filter: vk::DebugReportFlagsEXT,
        handler: DiagnosticHandler,
    ) -> Result<Option<MockRegistration>> {
        if !self.shared.script.diagnostics_entry_points {
            return Ok(None);
        }
        self.shared.push(Op::RegisterDiagnostics);
        self.shared.filter.set(filter);
        *self.shared.handler.borrow_mut() = Some(handler);
        Ok(Some(MockRegistration))
    }

    fn unregister_diagnostics(&self, _token: MockRegistration) {
        self.shared.push(Op::UnregisterDiagnostics);
        self.shared.handler.borrow_mut().take();
    }

    fn select_device(&self, requirements: &DeviceRequirements) -> Result<DeviceSelection<u32>> {
        self.shared.push(Op::SelectDevice);
        *self.shared.device_requirements.borrow_mut() = Some(requirements.extensions.clone());
        if !self.shared.script.device_available {
            anyhow::bail!("No suitable GPU found");
        }
        Ok(DeviceSelection {
            physical: PHYSICAL_DEVICE,
            present_queue_family: PRESENT_FAMILY,
        })
    }

    fn create_device(
        &self,
        selection: &DeviceSelection<u32>,
        _requirements: &DeviceRequirements,
    ) -> Result<MockDevice> {
        assert_eq!(selection.physical, PHYSICAL_DEVICE);
        self.shared.push(Op::CreateDevice);
        Ok(MockDevice {
            log: self.shared.log.clone(),
        })
    }

    fn create_surface(&self, _display: RawDisplayHandle, _window: RawWindowHandle) -> Result<u64> {
        self.shared.push(Op::CreateSurface);
        Ok(SURFACE)
    }

    fn surface_support(&self, physical: u32, queue_family: u32, surface: u64) -> Result<bool> {
        assert_eq!(physical, PHYSICAL_DEVICE);
        assert_eq!(queue_family, PRESENT_FAMILY);
        assert_eq!(surface, SURFACE);
        Ok(self.shared.script.present_supported)
    }

    fn surface_formats(&self, _physical: u32, _surface: u64) -> Result<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.shared.script.formats.clone())
    }

    fn destroy_surface(&self, surface: u64) {
        assert_eq!(surface, SURFACE);
        self.shared.push(Op::DestroySurface);
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.shared.push(Op::DestroyContext);
    }
}

pub struct MockDevice {
    log: OpLog,
}

impl LogicalDevice for MockDevice {
    fn wait_idle(&self) -> Result<()> {
        self.log.borrow_mut().push(Op::WaitIdle);
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Op::ReleaseDevice);
    }
}

/// Window whose pumps follow a script, then report quit.
pub struct MockWindow {
    log: OpLog,
    pumps: VecDeque<PumpStatus>,
    pub open: bool,
}

impl MockWindow {
    pub fn new(log: OpLog, pumps: impl IntoIterator<Item = PumpStatus>) -> Self {
        Self {
            log,
            pumps: pumps.into_iter().collect(),
            open: false,
        }
    }

    /// `frames` empty pumps, then a quit
    pub fn quitting_after(log: OpLog, frames: usize) -> Self {
        Self::new(log, std::iter::repeat(PumpStatus::Continue).take(frames))
    }
}

impl EventPump for MockWindow {
    fn pump_events(&mut self) -> PumpStatus {
        self.log.borrow_mut().push(Op::Pump);
        self.pumps.pop_front().unwrap_or(PumpStatus::Quit)
    }
}

impl NativeWindow for MockWindow {
    fn open(&mut self) -> Result<()> {
        self.log.borrow_mut().push(Op::OpenWindow);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.log.borrow_mut().push(Op::CloseWindow);
        self.open = false;
    }

    fn display_handle(&self) -> Result<RawDisplayHandle> {
        Ok(RawDisplayHandle::Web(WebDisplayHandle::new()))
    }

    fn window_handle(&self) -> Result<RawWindowHandle> {
        anyhow::ensure!(self.open, "window is not open");
        Ok(RawWindowHandle::Web(WebWindowHandle::new(1)))
    }

    fn inner_size(&self) -> (u32, u32) {
        (640, 480)
    }
}

/// Hooks that record calls, optionally failing the nth acquire (1-based).
pub struct RecordingHooks {
    log: OpLog,
    acquires: usize,
    pub fail_on_acquire: Option<usize>,
}

impl RecordingHooks {
    pub fn new(log: OpLog) -> Self {
        Self {
            log,
            acquires: 0,
            fail_on_acquire: None,
        }
    }
}

impl FrameHooks for RecordingHooks {
    fn acquire_back_buffer(&mut self) -> Result<()> {
        self.acquires += 1;
        if self.fail_on_acquire == Some(self.acquires) {
            anyhow::bail!("device lost");
        }
        self.log.borrow_mut().push(Op::Acquire);
        Ok(())
    }

    fn present_back_buffer(&mut self, elapsed: f64, delta: f64) -> Result<()> {
        self.log.borrow_mut().push(Op::Present { elapsed, delta });
        Ok(())
    }
}

/// Clock returning scripted readings; the last one repeats.
pub struct ScriptedClock {
    log: Option<OpLog>,
    readings: Vec<f64>,
    next: Cell<usize>,
}

impl ScriptedClock {
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            log: None,
            readings,
            next: Cell::new(0),
        }
    }

    /// Also record each reading in `log`
    pub fn logged(log: OpLog, readings: Vec<f64>) -> Self {
        Self {
            log: Some(log),
            ..Self::new(readings)
        }
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> f64 {
        if let Some(log) = &self.log {
            log.borrow_mut().push(Op::ClockRead);
        }
        let index = self.next.get().min(self.readings.len() - 1);
        self.next.set(self.next.get() + 1);
        self.readings[index]
    }
}

#[derive(Default)]
pub struct RecordingFps {
    pub deltas: Vec<f64>,
}

impl FrameRateAccumulator for RecordingFps {
    fn update(&mut self, delta: f64) {
        self.deltas.push(delta);
    }
}
