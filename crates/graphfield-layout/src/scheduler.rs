//! Run state, alpha cooling and progress.
//!
//! The scheduler only decides; it never touches simulation resources. The
//! facade asks it whether the force block runs this frame, runs the forces,
//! then reports back so alpha can cool.

use crate::ALPHA_MIN;

/// Alpha floor while the pointer is repelling points.
pub const MOUSE_ALPHA_FLOOR: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Never started, or stopped.
    Idle,
    Running,
    Paused,
    /// Alpha dropped below [`ALPHA_MIN`].
    Settled,
}

/// Lifecycle notifications, drained by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    Start { alpha: f32 },
    Tick { alpha: f32, progress: f32 },
    End,
    Pause,
    Unpause,
    Stop,
}

/// Frame gating inputs owned by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameGate {
    pub enable_simulation: bool,
    pub enable_simulation_during_zoom: bool,
    pub zooming: bool,
}

impl FrameGate {
    fn allows(&self) -> bool {
        self.enable_simulation && !(self.zooming && !self.enable_simulation_during_zoom)
    }
}

#[derive(Debug)]
pub struct SimulationScheduler {
    state: SchedulerState,
    alpha: f32,
    alpha_target: f32,
    alpha_decay: f32,
    progress: f32,
    is_running: bool,
    tick_count: u64,
    events: Vec<SimulationEvent>,
}

impl SimulationScheduler {
    /// A scheduler cooling by `alpha_decay` per tick toward `alpha_target`.
    pub fn new(alpha_decay: f32, alpha_target: f32) -> Self {
        Self {
            state: SchedulerState::Idle,
            alpha: 0.0,
            alpha_target,
            alpha_decay,
            progress: 0.0,
            is_running: false,
            tick_count: 0,
            events: Vec::new(),
        }
    }

    pub fn set_cooling(&mut self, alpha_decay: f32, alpha_target: f32) {
        self.alpha_decay = alpha_decay;
        self.alpha_target = alpha_target;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Ticks executed since the last start.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn start(&mut self, alpha: f32) {
        self.alpha = alpha;
        self.is_running = true;
        self.progress = 0.0;
        self.tick_count = 0;
        self.state = SchedulerState::Running;
        self.events.push(SimulationEvent::Start { alpha });
    }

    pub fn stop(&mut self) {
        self.is_running = false;
        self.alpha = 0.0;
        self.progress = 0.0;
        self.state = SchedulerState::Idle;
        self.events.push(SimulationEvent::Stop);
    }

    pub fn pause(&mut self) {
        self.is_running = false;
        if self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
        }
        self.events.push(SimulationEvent::Pause);
    }

    pub fn unpause(&mut self) {
        self.is_running = true;
        self.state = SchedulerState::Running;
        self.events.push(SimulationEvent::Unpause);
    }

    /// Whether the force block runs this frame.
    pub fn should_tick(&self, gate: FrameGate, forced: bool) -> bool {
        gate.allows() && (self.is_running || forced)
    }

    /// Settle if alpha already sits below the threshold. Called at frame start
    /// so no tick runs after settling.
    pub fn settle_if_cold(&mut self) -> bool {
        if self.is_running && self.alpha < ALPHA_MIN {
            self.settle();
            return true;
        }
        false
    }

    /// Cool alpha after a tick and settle when it drops below the threshold.
    ///
    /// Returns `true` when this tick settled the simulation.
    pub fn finish_tick(&mut self, mouse_active: bool) -> bool {
        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;
        if mouse_active && self.alpha < MOUSE_ALPHA_FLOOR {
            self.alpha = MOUSE_ALPHA_FLOOR;
        }
        self.progress = if self.alpha > 0.0 {
            (ALPHA_MIN / self.alpha).min(1.0).sqrt()
        } else {
            1.0
        };
        self.tick_count += 1;
        self.events.push(SimulationEvent::Tick {
            alpha: self.alpha,
            progress: self.progress,
        });
        tracing::trace!("tick {} alpha {:.5}", self.tick_count, self.alpha);

        if self.is_running && self.alpha < ALPHA_MIN {
            self.settle();
            return true;
        }
        false
    }

    /// Take every queued event.
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        std::mem::take(&mut self.events)
    }

    fn settle(&mut self) {
        self.is_running = false;
        self.progress = 1.0;
        self.state = SchedulerState::Settled;
        self.events.push(SimulationEvent::End);
        tracing::debug!("simulation settled after {} ticks", self.tick_count);
    }
}
