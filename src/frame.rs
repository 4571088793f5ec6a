// Frame driver - the per-frame run loop
//
// Each iteration: pump window events, stop on quit, acquire the back buffer,
// measure time, present. Nothing here knows what the hooks render.

use crate::backend::{EventPump, PumpStatus};
use anyhow::Result;
use std::time::Instant;

/// Acquire/present contract implemented by a concrete renderer.
pub trait FrameHooks {
    /// Must leave the renderer ready to record and submit this frame's work.
    fn acquire_back_buffer(&mut self) -> Result<()>;

    /// Produce and submit the frame's visible output.
    ///
    /// `elapsed` is seconds since the loop started, `delta` seconds since the previous frame.
    fn present_back_buffer(&mut self, elapsed: f64, delta: f64) -> Result<()>;
}

/// Monotonic time source, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Observes frame deltas. Never affects the loop.
pub trait FrameRateAccumulator {
    fn update(&mut self, delta: f64);
}

/// Seconds since construction.
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Averages frame rate over windows of at least one second.
#[derive(Debug, Default)]
pub struct FpsCounter {
    report: bool,
    frames: u32,
    accumulated: f64,
    fps: Option<f64>,
}

impl FpsCounter {
    /// `report` logs each completed window.
    pub fn new(report: bool) -> Self {
        Self {
            report,
            ..Default::default()
        }
    }

    /// Rate over the last completed window, if any.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }
}

impl FrameRateAccumulator for FpsCounter {
    fn update(&mut self, delta: f64) {
        self.frames += 1;
        self.accumulated += delta;

        if self.accumulated >= 1.0 {
            let fps = f64::from(self.frames) / self.accumulated;
            if self.report {
                log::info!("{:.0} FPS ({:.2}ms)", fps, 1000.0 / fps);
            }
            self.fps = Some(fps);
            self.frames = 0;
            self.accumulated = 0.0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Completed iterations (each one acquired and presented).
    pub frames: u64,
    /// Clock reading at the last measured frame.
    pub elapsed: f64,
}

pub struct FrameDriver<C, F> {
    clock: C,
    fps: F,
}

impl<C: Clock, F: FrameRateAccumulator> FrameDriver<C, F> {
    pub fn new(clock: C, fps: F) -> Self {
        Self { clock, fps }
    }

    pub fn fps(&self) -> &F {
        &self.fps
    }

    /// Loop until `events` reports a quit.
    ///
    /// A quit ends the loop before the next acquire. Hook errors end it too and are returned.
    pub fn run<P, H>(&mut self, events: &mut P, hooks: &mut H) -> Result<FrameStats>
    where
        P: EventPump + ?Sized,
        H: FrameHooks + ?Sized,
    {
        let mut prev = self.clock.now();
        let mut frames = 0;

        loop {
            if events.pump_events() == PumpStatus::Quit {
                break;
            }

            hooks.acquire_back_buffer()?;

            let now = self.clock.now();
            let delta = now - prev;
            self.fps.update(delta);
            prev = now;

            hooks.present_back_buffer(now, delta)?;
            frames += 1;
        }

        log::info!("Frame loop finished after {} frames", frames);
        Ok(FrameStats {
            frames,
            elapsed: prev,
        })
    }
}
