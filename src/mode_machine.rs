//! Display mode/effect state machine.
//!
//! Button handlers mutate [`DisplayIntent`]; the display loop compares it to
//! what is currently rendered on every tick, reloads the renderer on a
//! difference, and persists the selection once it has been left alone for
//! the quiet period.

use crate::effects::EFFECT_COUNT;
use crate::renderer::{RenderConfig, Renderer};
use crate::settings::{SettingsRecord, SettingsStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Number of layout modes.
pub const MODE_COUNT: u8 = 4;

/// Quiet period before a changed selection is persisted.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5);

/// Plain copy of the display selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentSnapshot {
    pub mode: u8,
    pub effect: u8,
    pub am_pm: bool,
}

impl From<IntentSnapshot> for SettingsRecord {
    fn from(snapshot: IntentSnapshot) -> Self {
        Self {
            mode: i64::from(snapshot.mode),
            effect: i64::from(snapshot.effect),
            am_pm_mode: snapshot.am_pm,
        }
    }
}

/// Desired display selection, written from input context.
///
/// Each field is an independent scalar atomic, so a reader sees either the
/// value before or after a concurrent write. Out-of-range values are wrapped
/// at the point of mutation and never reach the state machine.
#[derive(Debug)]
pub struct DisplayIntent {
    mode: AtomicU8,
    effect: AtomicU8,
    am_pm: AtomicBool,
    effect_count: u8,
}

impl DisplayIntent {
    /// Build the intent from a loaded settings record.
    pub fn from_record(record: SettingsRecord, effect_count: u8) -> Self {
        let effect_count = effect_count.max(1);
        Self {
            mode: AtomicU8::new(wrap(record.mode, MODE_COUNT)),
            effect: AtomicU8::new(wrap(record.effect, effect_count)),
            am_pm: AtomicBool::new(record.am_pm_mode),
            effect_count,
        }
    }

    /// Advance to the next layout mode, returning the new mode.
    pub fn cycle_mode(&self) -> u8 {
        Self::cycle(&self.mode, MODE_COUNT)
    }

    /// Advance to the next effect, returning the new effect index.
    pub fn cycle_effect(&self) -> u8 {
        Self::cycle(&self.effect, self.effect_count)
    }

    /// Flip 12/24-hour display, returning the new value.
    pub fn toggle_am_pm(&self) -> bool {
        !self.am_pm.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> IntentSnapshot {
        IntentSnapshot {
            mode: self.mode.load(Ordering::SeqCst),
            effect: self.effect.load(Ordering::SeqCst),
            am_pm: self.am_pm.load(Ordering::SeqCst),
        }
    }

    fn cycle(field: &AtomicU8, count: u8) -> u8 {
        let previous = field
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                Some((value % count + 1) % count)
            })
            .unwrap_or_else(|value| value);
        (previous % count + 1) % count
    }
}

fn wrap(value: i64, count: u8) -> u8 {
    value.rem_euclid(i64::from(count)) as u8
}

impl Default for DisplayIntent {
    fn default() -> Self {
        Self::from_record(SettingsRecord::default(), EFFECT_COUNT)
    }
}

/// Marks when the applied selection last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistenceTimer {
    changed_at: Option<Instant>,
}

impl PersistenceTimer {
    /// (Re)start the timer at `now`.
    pub fn restart(&mut self, now: Instant) {
        self.changed_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.changed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.changed_at.is_some()
    }

    /// Whether the quiet period has elapsed since the last change.
    pub fn is_due(&self, now: Instant, quiet_period: Duration) -> bool {
        self.changed_at
            .is_some_and(|changed| now.saturating_duration_since(changed) >= quiet_period)
    }
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub reloaded: bool,
    pub persisted: bool,
}

/// Owns the applied display state, the renderer and the settings store.
pub struct ModeEffectStateMachine<R: Renderer, S: SettingsStore> {
    renderer: R,
    store: S,
    applied: Option<IntentSnapshot>,
    timer: PersistenceTimer,
    quiet_period: Duration,
}

impl<R: Renderer, S: SettingsStore> ModeEffectStateMachine<R, S> {
    pub fn new(renderer: R, store: S, quiet_period: Duration) -> Self {
        Self {
            renderer,
            store,
            applied: None,
            timer: PersistenceTimer::default(),
            quiet_period,
        }
    }

    /// Selection currently on screen.
    #[cfg(test)]
    pub fn applied(&self) -> Option<IntentSnapshot> {
        self.applied
    }

    #[cfg(test)]
    pub fn timer(&self) -> PersistenceTimer {
        self.timer
    }

    #[cfg(test)]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Render the startup selection right away.
    ///
    /// Nothing is persisted for it: it came from the store in the first place.
    pub fn start(&mut self, intent: &DisplayIntent) {
        let snapshot = intent.snapshot();
        self.apply(snapshot);
        self.timer.clear();
    }

    /// Run one control tick now.
    pub fn tick(&mut self, intent: &DisplayIntent) -> TickOutcome {
        self.tick_at(intent, Instant::now())
    }

    /// Run one control tick at `now`.
    pub fn tick_at(&mut self, intent: &DisplayIntent, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let snapshot = intent.snapshot();

        if self.applied != Some(snapshot) {
            self.apply(snapshot);
            self.timer.restart(now);
            outcome.reloaded = true;
        }

        if self.timer.is_due(now, self.quiet_period) {
            self.persist(snapshot);
            outcome.persisted = true;
        }

        outcome
    }

    /// Write out a change that has not reached the quiet period yet.
    pub fn flush(&mut self) {
        if let (true, Some(applied)) = (self.timer.is_armed(), self.applied) {
            self.persist(applied);
        }
    }

    /// Stop the renderer for shutdown.
    pub fn shutdown(&mut self) {
        self.flush();
        self.renderer.stop();
    }

    fn apply(&mut self, snapshot: IntentSnapshot) {
        info!(
            "Change (mode {}, effect {}, am/pm {})",
            snapshot.mode, snapshot.effect, snapshot.am_pm
        );
        self.renderer.stop();
        self.renderer.start(RenderConfig::for_intent(snapshot));
        self.applied = Some(snapshot);
    }

    fn persist(&mut self, snapshot: IntentSnapshot) {
        info!("Saving the settings");
        if let Err(e) = self.store.save(&snapshot.into()) {
            warn!("Failed to save settings: {}", e);
        }
        self.timer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Position;
    use crate::settings::MemorySettingsStore;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(RenderConfig),
        Stop,
    }

    #[derive(Default)]
    struct MockRenderer {
        calls: Vec<Call>,
    }

    impl Renderer for MockRenderer {
        fn start(&mut self, config: RenderConfig) {
            self.calls.push(Call::Start(config));
        }

        fn stop(&mut self) {
            self.calls.push(Call::Stop);
        }
    }

    fn machine() -> ModeEffectStateMachine<MockRenderer, MemorySettingsStore> {
        ModeEffectStateMachine::new(
            MockRenderer::default(),
            MemorySettingsStore::new(),
            DEFAULT_QUIET_PERIOD,
        )
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_loaded_record_is_wrapped() {
        let intent = DisplayIntent::from_record(
            SettingsRecord {
                mode: 9,
                effect: 6,
                am_pm_mode: true,
            },
            EFFECT_COUNT,
        );
        assert_eq!(
            intent.snapshot(),
            IntentSnapshot {
                mode: 1,
                effect: 2,
                am_pm: true,
            }
        );

        let intent = DisplayIntent::from_record(
            SettingsRecord {
                mode: -1,
                effect: 300,
                am_pm_mode: true,
            },
            EFFECT_COUNT,
        );
        let snapshot = intent.snapshot();
        assert_eq!(snapshot.mode, 3);
        assert_eq!(snapshot.effect, 0);
        assert!(snapshot.am_pm);
    }

    #[test]
    fn test_cycles_wrap() {
        let intent = DisplayIntent::default();
        assert_eq!(intent.cycle_mode(), 1);
        assert_eq!(intent.cycle_mode(), 2);
        assert_eq!(intent.cycle_mode(), 3);
        assert_eq!(intent.cycle_mode(), 0);

        for _ in 0..EFFECT_COUNT - 1 {
            intent.cycle_effect();
        }
        assert_eq!(intent.cycle_effect(), 0);

        assert!(intent.toggle_am_pm());
        assert!(!intent.toggle_am_pm());
    }

    #[test]
    fn test_startup_renders_without_persisting() {
        let intent = DisplayIntent::from_record(
            SettingsRecord {
                mode: 2,
                effect: 1,
                am_pm_mode: false,
            },
            EFFECT_COUNT,
        );
        let mut machine = machine();
        machine.start(&intent);

        assert_eq!(machine.applied(), Some(intent.snapshot()));
        assert!(!machine.timer().is_armed());
        match machine.renderer().calls.last() {
            Some(Call::Start(config)) => assert_eq!(config.clock_position, Position::Center),
            other => panic!("expected a start call, got {:?}", other),
        }

        let start = Instant::now();
        let outcome = machine.tick_at(&intent, at(start, 10_000));
        assert_eq!(outcome, TickOutcome::default());
        assert!(machine.store().saves().is_empty());
    }

    #[test]
    fn test_change_is_one_stop_then_one_start() {
        let intent = DisplayIntent::default();
        let mut machine = machine();
        let start = Instant::now();

        machine.start(&intent);
        let before = machine.renderer().calls.len();

        intent.cycle_mode();
        let outcome = machine.tick_at(&intent, start);
        assert!(outcome.reloaded);

        let calls = &machine.renderer().calls[before..];
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Stop);
        assert!(matches!(calls[1], Call::Start(config) if config.clock_position == Position::Left));

        // No change, no reload
        let outcome = machine.tick_at(&intent, at(start, 250));
        assert!(!outcome.reloaded);
        assert_eq!(machine.renderer().calls.len(), before + 2);
    }

    #[test]
    fn test_persists_once_after_last_change() {
        let intent = DisplayIntent::default();
        let mut machine = machine();
        let start = Instant::now();
        machine.start(&intent);

        let mut persisted_at = Vec::new();
        for ms in (0..=15_000u64).step_by(250) {
            if ms == 0 || ms == 2_000 || ms == 6_000 {
                intent.cycle_effect();
            }
            if machine.tick_at(&intent, at(start, ms)).persisted {
                persisted_at.push(ms);
            }
        }

        assert_eq!(persisted_at, vec![11_000]);
        let saves = machine.store().saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].effect, 3);
    }

    #[test]
    fn test_flush_writes_pending_change() {
        let intent = DisplayIntent::default();
        let mut machine = machine();
        machine.start(&intent);
        machine.flush();
        assert!(machine.store().saves().is_empty());

        intent.toggle_am_pm();
        machine.tick_at(&intent, Instant::now());
        machine.shutdown();

        let saves = machine.store().saves();
        assert_eq!(saves.len(), 1);
        assert!(saves[0].am_pm_mode);
        assert_eq!(machine.renderer().calls.last(), Some(&Call::Stop));
    }
}
