//! Clock renderer.
//!
//! The display state machine drives a [`Renderer`] with one `start` per
//! state change. [`ClockRenderer`] runs a frame task per `start` and shares
//! the frame sink behind a mutex so that `stop` can guarantee no frame is
//! written once it returns.

use crate::effects::{text_width, EffectPipeline, Frame, DISPLAY_WIDTH};
use crate::mode_machine::IntentSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// Default frame period of the clock face.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Horizontal placement on the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
    Center,
}

/// What to do when the hour rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HourChangeCallback {
    #[default]
    None,
    CalendarRedraw,
}

/// Mode-specific renderer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub effect: u8,
    pub clock_position: Position,
    pub calendar_position: Option<Position>,
    pub show_seconds: bool,
    pub am_pm_mode: bool,
    pub hour_change: HourChangeCallback,
    pub char_spacing: Option<u8>,
}

impl RenderConfig {
    /// Build the configuration for a display intent.
    ///
    /// Modes 0 and 1 put the calendar beside the clock and redraw it on
    /// the hour; modes 2 and 3 center the clock alone, mode 3 without seconds.
    pub fn for_intent(intent: IntentSnapshot) -> Self {
        let base = Self {
            effect: intent.effect,
            clock_position: Position::Right,
            calendar_position: None,
            show_seconds: true,
            am_pm_mode: intent.am_pm,
            hour_change: HourChangeCallback::None,
            char_spacing: None,
        };

        match intent.mode {
            0 => Self {
                clock_position: Position::Right,
                calendar_position: Some(Position::Left),
                hour_change: HourChangeCallback::CalendarRedraw,
                ..base
            },
            1 => Self {
                clock_position: Position::Left,
                calendar_position: Some(Position::Right),
                hour_change: HourChangeCallback::CalendarRedraw,
                ..base
            },
            2 => Self {
                clock_position: Position::Center,
                char_spacing: Some(2),
                ..base
            },
            _ => Self {
                clock_position: Position::Center,
                show_seconds: false,
                char_spacing: Some(2),
                ..base
            },
        }
    }

    /// Extra pixels after glyph `index`.
    pub fn spacing(&self, index: usize) -> i32 {
        match self.char_spacing {
            Some(fixed) => i32::from(fixed),
            None => {
                if matches!(index, 0 | 3 | 6) {
                    1
                } else {
                    0
                }
            }
        }
    }

    /// X coordinate of the first glyph for `text`.
    pub fn origin_x(&self, text: &str) -> i32 {
        let width = text_width(text, |index, _| self.spacing(index));
        match self.clock_position {
            Position::Left => 0,
            Position::Right => (DISPLAY_WIDTH - width).max(0),
            Position::Center => ((DISPLAY_WIDTH - width) / 2).max(0),
        }
    }
}

/// Anything that can show the clock.
pub trait Renderer {
    /// Start drawing with `config`, replacing whatever was running.
    fn start(&mut self, config: RenderConfig);

    /// Stop drawing. Safe to call at any time; no frame is drawn after it returns.
    fn stop(&mut self);
}

/// Output surface for composed frames.
pub trait FrameSink {
    fn clear(&mut self);
    fn draw_calendar(&mut self, position: Position);
    fn write_frame(&mut self, frame: &Frame);
}

/// Frame sink shared between the renderer and its frame task.
pub type SharedSink = Arc<Mutex<dyn FrameSink + Send>>;

/// Host sink that logs frames instead of driving LEDs.
#[derive(Debug, Default)]
pub struct TracingFrameSink {
    last_text: String,
}

impl FrameSink for TracingFrameSink {
    fn clear(&mut self) {
        self.last_text.clear();
        trace!("Display cleared");
    }

    fn draw_calendar(&mut self, position: Position) {
        debug!("Calendar drawn on the {:?}", position);
    }

    fn write_frame(&mut self, frame: &Frame) {
        let text = frame.text();
        if text != self.last_text {
            trace!("Frame: {}", text);
            self.last_text = text;
        }
    }
}

/// Wall-clock reading used for the clock face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Source of wall-clock time.
pub type TimeSource = Arc<dyn Fn() -> WallTime + Send + Sync>;

/// Local time, falling back to UTC when the local offset is unknown.
pub fn local_time() -> WallTime {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    WallTime {
        hour: now.hour(),
        minute: now.minute(),
        second: now.second(),
    }
}

/// Clock text for `time`, e.g. `21:05:09`, `09:05:09` or `21:05`.
pub fn clock_text(time: WallTime, show_seconds: bool, am_pm_mode: bool) -> String {
    let hour = if am_pm_mode {
        match time.hour % 12 {
            0 => 12,
            h => h,
        }
    } else {
        time.hour
    };

    if show_seconds {
        format!("{:02}:{:02}:{:02}", hour, time.minute, time.second)
    } else {
        format!("{:02}:{:02}", hour, time.minute)
    }
}

fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, dyn FrameSink + Send + 'static> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Renderer running one frame task per configuration.
pub struct ClockRenderer {
    sink: SharedSink,
    frame_interval: Duration,
    time_source: TimeSource,
    alive: Option<Arc<AtomicBool>>,
    task: Option<JoinHandle<()>>,
}

impl ClockRenderer {
    pub fn new(sink: SharedSink, frame_interval: Duration) -> Self {
        Self::with_time_source(sink, frame_interval, Arc::new(local_time))
    }

    pub fn with_time_source(sink: SharedSink, frame_interval: Duration, time_source: TimeSource) -> Self {
        Self {
            sink,
            frame_interval,
            time_source,
            alive: None,
            task: None,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.alive
            .as_ref()
            .is_some_and(|alive| alive.load(Ordering::SeqCst))
    }
}

impl Renderer for ClockRenderer {
    fn start(&mut self, config: RenderConfig) {
        self.stop();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start renderer outside the runtime: {}", e);
                return;
            }
        };

        {
            let mut sink = lock_sink(&self.sink);
            sink.clear();
            if let Some(position) = config.calendar_position {
                sink.draw_calendar(position);
            }
        }

        let alive = Arc::new(AtomicBool::new(true));
        let task = runtime.spawn(run_frames(
            config,
            Arc::clone(&self.sink),
            Arc::clone(&alive),
            self.frame_interval,
            Arc::clone(&self.time_source),
        ));

        debug!("Renderer started: {:?}", config);
        self.alive = Some(alive);
        self.task = Some(task);
    }

    fn stop(&mut self) {
        if let Some(alive) = self.alive.take() {
            alive.store(false, Ordering::SeqCst);
            // Wait out a frame write that passed its liveness check before the flag flipped.
            drop(lock_sink(&self.sink));
            debug!("Renderer stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ClockRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame loop for one renderer configuration.
async fn run_frames(
    config: RenderConfig,
    sink: SharedSink,
    alive: Arc<AtomicBool>,
    frame_interval: Duration,
    time_source: TimeSource,
) {
    let pipeline = EffectPipeline::for_index(config.effect);
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut frame_index: u32 = 0;
    let mut previous: Vec<char> = Vec::new();
    let mut changed_at: Vec<u32> = Vec::new();
    let mut last_hour: Option<u8> = None;

    loop {
        ticker.tick().await;
        if !alive.load(Ordering::SeqCst) {
            break;
        }

        let now = time_source();
        let text = clock_text(now, config.show_seconds, config.am_pm_mode);

        let chars: Vec<char> = text.chars().collect();
        if chars.len() != changed_at.len() {
            changed_at = vec![frame_index; chars.len()];
        } else {
            for (index, ch) in chars.iter().enumerate() {
                if previous.get(index) != Some(ch) {
                    changed_at[index] = frame_index;
                }
            }
        }
        previous = chars;

        let hour_changed = last_hour.is_some_and(|hour| hour != now.hour);
        last_hour = Some(now.hour);

        let frame = pipeline.compose(
            &text,
            config.origin_x(&text),
            |index, _| config.spacing(index),
            frame_index,
            &changed_at,
        );

        {
            let mut sink = lock_sink(&sink);
            if !alive.load(Ordering::SeqCst) {
                break;
            }
            if hour_changed && config.hour_change == HourChangeCallback::CalendarRedraw {
                if let Some(position) = config.calendar_position {
                    sink.draw_calendar(position);
                }
            }
            sink.write_frame(&frame);
        }

        frame_index = frame_index.wrapping_add(1);
    }
}
