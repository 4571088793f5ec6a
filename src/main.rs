// =============================================================================
// DEMO - clear the window to an animated colour until it is closed
// =============================================================================
//
// FLOW:
// 1. Start logging, load config.toml
// 2. Bootstrapper::initialize  (layers, context, diagnostics, device, window, surface)
// 3. ClearRenderer on the negotiated surface
// 4. run until the window is closed or ESC is pressed
// 5. Renderer dropped, then the bootstrapper tears down in reverse order

use anyhow::{Context, Result};
use vk_base::backend::{NativeWindow, VulkanLoader};
use vk_base::renderer::{ClearRenderer, RendererSettings};
use vk_base::window::WinitWindow;
use vk_base::{Bootstrapper, Config};

fn main() {
    init_logging();

    if let Err(e) = run() {
        log::error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();
    log::info!("Starting {}", config.window.title);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let program = config.program_config();
    let loader = VulkanLoader::load()?;
    let window = WinitWindow::new(&config.window)?;

    let mut base = Bootstrapper::new(program.clone(), loader, window);
    base.initialize(program.preferred_color_format)?;

    let (width, height) = base.window().inner_size();
    log::info!("Drawable size: {}x{}", width, height);

    let settings = RendererSettings {
        clear_color: config.graphics.clear_color,
        present_mode: config.get_present_mode(),
        max_frames_in_flight: config.graphics.max_frames_in_flight,
    };

    // Declared after `base` so it is dropped first on every path
    let mut renderer = {
        let context = base.context().context("Context not initialized")?;
        let device = base.device().context("Device not initialized")?;
        let surface = base.surface().context("Surface not initialized")?;
        ClearRenderer::new(
            context,
            &device.device,
            surface,
            base.window().drawable_size(),
            &settings,
        )?
    };

    let stats = base.run(&mut renderer)?;
    log::info!(
        "Rendered {} frames in {:.2}s",
        stats.frames,
        stats.elapsed
    );

    drop(renderer);
    base.teardown();
    Ok(())
}

/// Info by default, RUST_LOG overrides
fn init_logging() {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
}
