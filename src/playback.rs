use crate::error::RecordingError;
use crate::input::InputState;
use crate::utilities::SerdeJsonQuick;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldInput {
    pub state: InputState,
    pub ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputRecording {
    pub entries: Vec<HeldInput>,
}

impl SerdeJsonQuick for InputRecording {
    type Error = RecordingError;
}

impl InputRecording {
    pub fn tick_count(&self) -> u64 {
        self.entries.iter().map(|e| e.ticks as u64).sum()
    }
}

/// Run-length encodes the per-tick input stream.
#[derive(Debug, Clone, Default)]
pub struct InputRecorder {
    recording: InputRecording,
}

impl InputRecorder {
    pub fn new() -> InputRecorder {
        Default::default()
    }

    pub fn record(&mut self, state: InputState) {
        match self.recording.entries.last_mut() {
            Some(last) if last.state == state => last.ticks += 1,
            _ => self.recording.entries.push(HeldInput { state, ticks: 1 }),
        }
    }

    pub fn recording(&self) -> &InputRecording {
        &self.recording
    }

    pub fn finish(self) -> InputRecording {
        self.recording
    }
}

pub struct PlaybackDriver {
    state_stack: Vec<HeldInput>,
    update_id: u32,
}

impl PlaybackDriver {
    pub fn new(recording: InputRecording) -> PlaybackDriver {
        let mut state_stack: Vec<HeldInput> = recording
            .entries
            .into_iter()
            .filter(|e| e.ticks > 0)
            .collect();
        state_stack.reverse();

        PlaybackDriver {
            state_stack,
            update_id: 0,
        }
    }

    /// Input for the next tick, or `None` once the recording is exhausted.
    pub fn next_input(&mut self) -> Option<InputState> {
        let held = *self.state_stack.last()?;
        self.update_id += 1;
        if self.update_id >= held.ticks {
            self.state_stack.pop();
            self.update_id = 0;
        }
        Some(held.state)
    }

    pub fn is_finished(&self) -> bool {
        self.state_stack.is_empty()
    }
}
