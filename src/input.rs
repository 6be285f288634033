//! Button input routing.
//!
//! Raw edges arrive on a bounded queue from whatever registers the edge
//! interrupts (the control socket on a host build). Each source has its own
//! debounce gate, checked before the handler logic runs; handlers only
//! write scalar intent fields.

use crate::brightness::{BrightnessIntent, BRIGHTNESS_STEP};
use crate::debounce::DebounceGate;
use crate::mode_machine::DisplayIntent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Capacity of the raw edge queue.
pub const EDGE_QUEUE_CAPACITY: usize = 32;

/// The five physical buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    ModeSwitch,
    EffectSwitch,
    AmPmToggle,
    BrightnessDown,
    BrightnessUp,
}

impl InputSource {
    fn index(self) -> usize {
        match self {
            InputSource::ModeSwitch => 0,
            InputSource::EffectSwitch => 1,
            InputSource::AmPmToggle => 2,
            InputSource::BrightnessDown => 3,
            InputSource::BrightnessUp => 4,
        }
    }
}

/// One raw edge as seen by the interrupt source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEdge {
    pub source: InputSource,
    pub at: Instant,
}

impl RawEdge {
    pub fn now(source: InputSource) -> Self {
        Self {
            source,
            at: Instant::now(),
        }
    }
}

/// Sender half of the edge queue.
pub type EdgeSender = mpsc::Sender<RawEdge>;
/// Receiver half of the edge queue.
pub type EdgeReceiver = mpsc::Receiver<RawEdge>;

/// Create the bounded edge queue.
pub fn edge_queue() -> (EdgeSender, EdgeReceiver) {
    mpsc::channel(EDGE_QUEUE_CAPACITY)
}

/// Debounces edges and applies accepted presses to the shared intent.
pub struct InputRouter {
    gates: [DebounceGate; 5],
    display: Arc<DisplayIntent>,
    brightness: Arc<BrightnessIntent>,
}

impl InputRouter {
    pub fn new(display: Arc<DisplayIntent>, brightness: Arc<BrightnessIntent>, refractory: Duration) -> Self {
        Self {
            gates: std::array::from_fn(|_| DebounceGate::new(refractory)),
            display,
            brightness,
        }
    }

    /// Handle one raw edge. Returns whether it passed the debounce gate.
    pub fn handle(&mut self, edge: RawEdge) -> bool {
        if !self.gates[edge.source.index()].should_fire_at(edge.at) {
            debug!("Bounce on {:?} dropped", edge.source);
            return false;
        }

        match edge.source {
            InputSource::ModeSwitch => {
                let mode = self.display.cycle_mode();
                info!("Mode switch pressed (mode {})", mode);
            }
            InputSource::EffectSwitch => {
                let effect = self.display.cycle_effect();
                info!("Effect switch pressed (effect {})", effect);
            }
            InputSource::AmPmToggle => {
                let am_pm = self.display.toggle_am_pm();
                info!("AM/PM toggled ({})", if am_pm { "12h" } else { "24h" });
            }
            InputSource::BrightnessDown => {
                if let Some(level) = self.brightness.adjust(-BRIGHTNESS_STEP) {
                    info!("Lux - pressed (level {})", level);
                }
            }
            InputSource::BrightnessUp => {
                if let Some(level) = self.brightness.adjust(BRIGHTNESS_STEP) {
                    info!("Lux + pressed (level {})", level);
                }
            }
        }
        true
    }

    /// Drain the edge queue until it closes or shutdown is signalled.
    pub async fn run(mut self, mut edges: EdgeReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Input router shutting down");
                        break;
                    }
                }
                edge = edges.recv() => {
                    match edge {
                        Some(edge) => {
                            self.handle(edge);
                        }
                        None => {
                            info!("Input queue closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
