use std::time::{Duration, Instant};

/// Minimum interval between window title updates.
pub const TITLE_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Averaged frame timing over one title refresh interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Mean frame time in milliseconds.
    pub frame_ms: f64,
    pub fps: f64,
}

/// Counts presented frames and reports their average once per refresh
/// interval.
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    window_start: Instant,
    frames: u32,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
        }
    }

    /// Records a presented frame; returns the averaged timing when the refresh
    /// interval has elapsed and starts a new interval.
    pub fn frame_presented(&mut self, now: Instant) -> Option<FrameTiming> {
        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < TITLE_REFRESH_INTERVAL {
            return None;
        }
        let seconds = elapsed.as_secs_f64();
        let frames = f64::from(self.frames);
        self.window_start = now;
        self.frames = 0;
        Some(FrameTiming {
            frame_ms: seconds * 1000.0 / frames,
            fps: frames / seconds,
        })
    }
}

/// What the window title shows about the running program.
#[derive(Debug, Clone, Copy)]
pub struct TitleStatus<'a> {
    pub title: &'a str,
    pub label: &'a str,
    pub alternate: bool,
    pub error_visible: bool,
}

pub fn format_title(status: &TitleStatus<'_>, timing: &FrameTiming) -> String {
    let mut title = format!(
        "{} | {}{} | {:.1}ms ({:.0} FPS)",
        status.title,
        status.label,
        if status.alternate { " (solution)" } else { "" },
        timing.frame_ms,
        timing.fps,
    );
    if status.error_visible {
        title.push_str(" | compilation failed, check output");
    }
    title
}
