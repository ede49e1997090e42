//! Beat-event relay
//!
//! Clicks are scheduled up to one lookahead window before they are heard.
//! The relay keeps them in a FIFO until the clock reaches their start time
//! and then surfaces the latest one as the "active beat" for display.
//!
//! Only the most recent due event survives a drain: visual state follows
//! the latest click, it never replays a backlog of highlights.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::ClickEvent;

/// Position of the click currently sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveBeat {
    pub beat: u32,
    pub sub_beat: u32,
}

impl ActiveBeat {
    /// Whether the display segment `(beat, sub_beat)` should be lit.
    ///
    /// Only the current sub-beat is lit; earlier sub-beats of the same beat
    /// are not kept filled.
    pub fn lights(&self, beat: u32, sub_beat: u32) -> bool {
        self.beat == beat && self.sub_beat == sub_beat
    }
}

#[derive(Debug, Default)]
pub struct BeatRelay {
    queue: VecDeque<ClickEvent>,
    active: Option<ActiveBeat>,
}

impl BeatRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scheduled event. Events arrive in time order.
    pub fn push(&mut self, event: ClickEvent) {
        self.queue.push_back(event);
    }

    /// Pop every event due at or before `now` and make the last one active.
    ///
    /// Returns how many events were popped; zero leaves the relay untouched.
    pub fn drain(&mut self, now: f64) -> usize {
        let mut popped = 0;
        while let Some(front) = self.queue.front() {
            if front.scheduled_time > now {
                break;
            }
            if let Some(event) = self.queue.pop_front() {
                self.active = Some(event.position());
                popped += 1;
            }
        }
        popped
    }

    /// Discard pending events and clear the active beat.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.active = None;
    }

    pub fn active(&self) -> Option<ActiveBeat> {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Start time of the next event still waiting to become audible
    pub fn next_due(&self) -> Option<f64> {
        self.queue.front().map(|event| event.scheduled_time)
    }
}
