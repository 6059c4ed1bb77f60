//! Simulation controller (C5): alpha/temperature state machine.

/// Lifecycle state of a [`SimulationController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Events the controller emits; best-effort broadcast to registered
/// [`EventSink`]s. A handler that panics is never allowed to unwind past
/// the controller — see [`SimulationController::tick`].
#[derive(Debug, Clone, Copy)]
pub enum ControllerEvent {
    Tick { alpha: f32, tick_count: u64 },
    End { tick_count: u64 },
    Pause { alpha: f32 },
    Resume { alpha: f32 },
    Restart { alpha: f32 },
}

/// Receives controller events. Implement this to drive UI updates, metrics,
/// or anything else that should react to simulation lifecycle changes.
pub trait EventSink {
    fn on_event(&mut self, event: ControllerEvent);
}

/// Alpha (temperature) state machine driving the cooling schedule described
/// in the design: `start`/`pause`/`stop`/`restart`/`tick`, with
/// `α ← α + (α_target − α)·α_decay` applied once per tick.
///
/// The simulation intentionally never auto-stops on low alpha: drag
/// interactions should always be able to re-energize the current layout.
pub struct SimulationController {
    state: ControllerState,
    alpha: f32,
    alpha_initial: f32,
    alpha_target: f32,
    alpha_min: f32,
    alpha_decay: f32,
    tick_count: u64,
    sinks: Vec<Box<dyn EventSink>>,
}

impl SimulationController {
    pub fn new(alpha_initial: f32, alpha_target: f32, alpha_min: f32, alpha_decay: f32) -> Self {
        Self {
            state: ControllerState::Idle,
            alpha: 0.0,
            alpha_initial,
            alpha_target,
            alpha_min,
            alpha_decay,
            tick_count: 0,
            sinks: Vec::new(),
        }
    }

    pub fn from_config(cfg: &crate::SimulationConfig) -> Self {
        Self::new(cfg.alpha_initial, cfg.alpha_target, cfg.alpha_min, cfg.alpha_decay)
    }

    pub fn register_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// `idle`/`paused` -> `running`. Resets alpha to `alpha_initial` only if
    /// no ticks have been recorded yet (fresh start, not a resume).
    pub fn start(&mut self) {
        if self.tick_count == 0 {
            self.alpha = self.alpha_initial;
        }
        let was_paused = self.state == ControllerState::Paused;
        self.state = ControllerState::Running;
        if was_paused {
            self.emit(ControllerEvent::Resume { alpha: self.alpha });
        }
    }

    /// `running` -> `paused`. No-op from any other state.
    pub fn pause(&mut self) {
        if self.state == ControllerState::Running {
            self.state = ControllerState::Paused;
            self.emit(ControllerEvent::Pause { alpha: self.alpha });
        }
    }

    /// Any state -> `stopped`. Resets alpha and tick count to zero and
    /// emits `end`.
    pub fn stop(&mut self) {
        self.state = ControllerState::Stopped;
        self.alpha = 0.0;
        let tick_count = self.tick_count;
        self.tick_count = 0;
        self.emit(ControllerEvent::End { tick_count });
    }

    /// Any state -> `running`, resetting alpha to `alpha_initial` and the
    /// tick count to zero.
    pub fn restart(&mut self) {
        self.alpha = self.alpha_initial;
        self.tick_count = 0;
        self.state = ControllerState::Running;
        self.emit(ControllerEvent::Restart { alpha: self.alpha });
    }

    /// Apply one step of the cooling law and emit `tick`. No-op (returns
    /// `None`) if not currently `running`.
    pub fn tick(&mut self) -> Option<f32> {
        if self.state != ControllerState::Running {
            return None;
        }
        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;
        self.tick_count += 1;
        self.emit(ControllerEvent::Tick {
            alpha: self.alpha,
            tick_count: self.tick_count,
        });
        Some(self.alpha)
    }

    fn emit(&mut self, event: ControllerEvent) {
        for sink in &mut self.sinks {
            sink.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<String>>>);
    impl EventSink for RecordingSink {
        fn on_event(&mut self, event: ControllerEvent) {
            let label = match event {
                ControllerEvent::Tick { .. } => "tick",
                ControllerEvent::End { .. } => "end",
                ControllerEvent::Pause { .. } => "pause",
                ControllerEvent::Resume { .. } => "resume",
                ControllerEvent::Restart { .. } => "restart",
            };
            self.0.lock().unwrap().push(label.to_string());
        }
    }

    #[test]
    fn starts_idle_and_transitions_to_running() {
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        assert_eq!(c.state(), ControllerState::Idle);
        c.start();
        assert_eq!(c.state(), ControllerState::Running);
        assert_eq!(c.alpha(), 1.0);
    }

    #[test]
    fn tick_applies_cooling_law_and_increments_count() {
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        c.start();
        let a1 = c.tick().unwrap();
        let expected = 1.0 + (0.1 - 1.0) * 0.0228;
        assert!((a1 - expected).abs() < 1e-6);
        assert_eq!(c.tick_count(), 1);
    }

    #[test]
    fn tick_is_noop_when_not_running() {
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        assert!(c.tick().is_none());
        c.start();
        c.pause();
        assert!(c.tick().is_none());
    }

    #[test]
    fn stop_resets_alpha_and_ticks_and_emits_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        c.register_sink(Box::new(RecordingSink(log.clone())));
        c.start();
        c.tick();
        c.stop();
        assert_eq!(c.state(), ControllerState::Stopped);
        assert_eq!(c.alpha(), 0.0);
        assert_eq!(c.tick_count(), 0);
        assert!(log.lock().unwrap().contains(&"end".to_string()));
    }

    #[test]
    fn restart_resets_to_alpha_initial_and_emits_restart() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        c.register_sink(Box::new(RecordingSink(log.clone())));
        c.start();
        c.tick();
        c.tick();
        c.restart();
        assert_eq!(c.alpha(), 1.0);
        assert_eq!(c.tick_count(), 0);
        assert!(log.lock().unwrap().contains(&"restart".to_string()));
    }

    #[test]
    fn pause_then_start_emits_resume_not_reset_alpha() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut c = SimulationController::new(1.0, 0.1, 0.001, 0.0228);
        c.register_sink(Box::new(RecordingSink(log.clone())));
        c.start();
        c.tick();
        let alpha_before_pause = c.alpha();
        c.pause();
        c.start();
        assert_eq!(c.state(), ControllerState::Running);
        assert_eq!(c.alpha(), alpha_before_pause);
        assert!(log.lock().unwrap().contains(&"resume".to_string()));
    }

    #[test]
    fn alpha_never_goes_negative_across_many_ticks() {
        let mut c = SimulationController::new(1.0, 0.0, 0.001, 0.0228);
        c.start();
        for _ in 0..1000 {
            c.tick();
        }
        assert!(c.alpha() >= 0.0);
    }
}
