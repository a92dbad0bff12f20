use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline Engine lifecycle. Transitions: `Idle -> Prewarming -> Running ->
/// Stopping -> Idle`. Stored as an `AtomicU8` so the worker thread and any
/// control-plane caller (Track Manager, metrics poller) can read/write it
/// without a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Prewarming = 1,
    Running = 2,
    Stopping = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Prewarming,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Idle,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Prewarming => "prewarming",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Shared, lock-free state cell for a Pipeline.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: PipelineState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_every_state() {
        let cell = StateCell::new(PipelineState::Idle);
        for state in [
            PipelineState::Prewarming,
            PipelineState::Running,
            PipelineState::Stopping,
            PipelineState::Idle,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
