// Native window - winit behind the NativeWindow interface
//
// The frame loop owns the control flow, so the event loop is pumped with a
// zero timeout instead of being handed over to `run_app`. The window itself
// can only be created from inside a pump (winit 0.30 hands out the active
// event loop in callbacks only), so `open` pumps until it exists.

use crate::backend::{EventPump, NativeWindow, PumpStatus};
use crate::config::WindowConfig;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{self, EventLoopExtPumpEvents},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

/// Upper bound on pumps while waiting for the platform to hand us a window.
const OPEN_ATTEMPTS: usize = 100;

pub struct WinitWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

/// Latest drawable size in physical pixels, shared with whatever sizes the
/// back buffers. Updated from resize events while the loop is pumped.
#[derive(Debug, Clone, Default)]
pub struct DrawableSize(Arc<Mutex<(u32, u32)>>);

impl DrawableSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self(Arc::new(Mutex::new((width, height))))
    }

    pub fn get(&self) -> (u32, u32) {
        *self.0.lock()
    }

    pub fn set(&self, width: u32, height: u32) {
        *self.0.lock() = (width, height);
    }
}

/// Everything the event callbacks touch
struct WindowState {
    attributes: WindowAttributes,
    wants_window: bool,
    window: Option<Window>,
    create_error: Option<String>,
    quit: bool,
    size: DrawableSize,
}

impl WinitWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        Ok(Self {
            event_loop,
            state: WindowState::new(attributes, DrawableSize::new(config.width, config.height)),
        })
    }

    /// Handle to the drawable size, kept current by the event pump.
    pub fn drawable_size(&self) -> DrawableSize {
        self.state.size.clone()
    }

    fn pump(&mut self) -> PumpStatus {
        match self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
        {
            pump_events::PumpStatus::Exit(code) => {
                log::debug!("Event loop exited with code {}", code);
                self.state.quit = true;
                PumpStatus::Quit
            }
            pump_events::PumpStatus::Continue if self.state.quit => PumpStatus::Quit,
            pump_events::PumpStatus::Continue => PumpStatus::Continue,
        }
    }

    fn window(&self) -> Result<&Window> {
        self.state.window.as_ref().context("Window is not open")
    }
}

impl WindowState {
    fn new(attributes: WindowAttributes, size: DrawableSize) -> Self {
        Self {
            attributes,
            wants_window: false,
            window: None,
            create_error: None,
            quit: false,
            size,
        }
    }

    fn on_resized(&mut self, size: PhysicalSize<u32>) {
        log::debug!("Window resized to {}x{}", size.width, size.height);
        self.size.set(size.width, size.height);
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) {
        if !self.wants_window || self.window.is_some() || self.create_error.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                log::info!("Window created");
                self.on_resized(window.inner_size());
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn request_quit(&mut self, event_loop: &ActiveEventLoop) {
        self.quit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.ensure_window(event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Anything after a quit in the same pump is dropped
        if self.quit {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.request_quit(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.request_quit(event_loop);
                }
            }
            WindowEvent::Resized(size) => self.on_resized(size),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.ensure_window(event_loop);
    }
}

impl EventPump for WinitWindow {
    fn pump_events(&mut self) -> PumpStatus {
        if self.state.quit {
            return PumpStatus::Quit;
        }
        self.pump()
    }
}

impl NativeWindow for WinitWindow {
    fn open(&mut self) -> Result<()> {
        self.state.wants_window = true;

        for _ in 0..OPEN_ATTEMPTS {
            if self.state.window.is_some() {
                return Ok(());
            }
            if let Some(e) = self.state.create_error.take() {
                anyhow::bail!("Failed to create window: {}", e);
            }
            if self.pump() == PumpStatus::Quit {
                anyhow::bail!("Event loop exited before the window was created");
            }
        }

        self.state.window.as_ref().map(|_| ()).with_context(|| {
            format!("Window was not created after {} event pumps", OPEN_ATTEMPTS)
        })
    }

    fn close(&mut self) {
        self.state.wants_window = false;
        if self.state.window.take().is_some() {
            log::info!("Window closed");
        }
    }

    fn display_handle(&self) -> Result<RawDisplayHandle> {
        Ok(self
            .event_loop
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw())
    }

    fn window_handle(&self) -> Result<RawWindowHandle> {
        Ok(self
            .window()?
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw())
    }

    fn inner_size(&self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_reaches_every_size_handle() {
        let size = DrawableSize::new(1280, 720);
        let mut state = WindowState::new(WindowAttributes::default(), size.clone());
        let renderer_side = size.clone();

        state.on_resized(PhysicalSize::new(1920, 1080));
        assert_eq!(renderer_side.get(), (1920, 1080));

        state.on_resized(PhysicalSize::new(0, 0));
        assert_eq!(size.get(), (0, 0));
    }
}
