//! Loop bookkeeping: where a render must stop, when the jump back to loop
//! start is due, and the decoder state captured at loop start.

use crate::coding::ChannelState;
use crate::models::{ChannelHistory, LoopRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    BeforeLoop,
    InLoop,
    AfterLoopExhausted,
}

#[derive(Debug)]
pub struct LoopController {
    region: Option<LoopRegion>,
    /// Maximum number of jumps; `None` loops forever
    limit: Option<u32>,
    transitions: u32,
    pending_jump: bool,
    capture: bool,
    snapshot: Option<Vec<ChannelState>>,
    stored_history: Option<Vec<ChannelHistory>>,
}

impl LoopController {
    pub fn new(
        region: Option<LoopRegion>,
        limit: Option<u32>,
        capture: bool,
        stored_history: Option<Vec<ChannelHistory>>,
    ) -> Self {
        Self {
            region,
            limit,
            transitions: 0,
            pending_jump: false,
            capture,
            snapshot: None,
            stored_history: if region.is_some() { stored_history } else { None },
        }
    }

    pub fn region(&self) -> Option<LoopRegion> {
        self.region
    }

    /// Whether reaching loop end will still jump back
    pub fn looping(&self) -> bool {
        self.region.is_some() && self.limit.map_or(true, |limit| self.transitions < limit)
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn pending_jump(&self) -> bool {
        self.pending_jump
    }

    /// Exclusive end of what may be rendered from `position` without a jump
    pub fn render_limit(&self, position: u64, num_samples: u64) -> u64 {
        match self.region {
            Some(region) if self.looping() && position < region.end => region.end,
            _ => num_samples,
        }
    }

    /// Arm the jump when a render stopped exactly on loop end
    pub fn after_render(&mut self, position: u64) {
        if let Some(region) = self.region {
            if self.looping() && position == region.end {
                self.pending_jump = true;
            }
        }
    }

    /// Take an armed jump, counting the transition. Returns the target.
    pub fn take_jump(&mut self) -> Option<u64> {
        if !self.pending_jump {
            return None;
        }
        self.pending_jump = false;
        self.transitions += 1;
        self.region.map(|region| region.start)
    }

    /// Undo `take_jump` after the jump itself failed
    pub fn rearm(&mut self) {
        self.pending_jump = true;
        self.transitions = self.transitions.saturating_sub(1);
    }

    pub fn cancel_jump(&mut self) {
        self.pending_jump = false;
    }

    pub fn state(&self, position: u64, num_samples: u64) -> LoopState {
        if self.pending_jump {
            return LoopState::InLoop;
        }
        match self.region {
            Some(region) if position < region.start => LoopState::BeforeLoop,
            Some(region) if position < region.end || (self.looping() && position == region.end) => {
                LoopState::InLoop
            }
            Some(_) => LoopState::AfterLoopExhausted,
            None if position >= num_samples => LoopState::AfterLoopExhausted,
            None => LoopState::BeforeLoop,
        }
    }

    /// Position up to which decoding must stop so the loop-start state can be captured
    pub fn capture_point(&self) -> Option<u64> {
        match self.region {
            Some(region) if self.capture && self.snapshot.is_none() => Some(region.start),
            _ => None,
        }
    }

    pub fn capture(&mut self, position: u64, states: &[ChannelState]) {
        if self.capture_point() == Some(position) {
            log::trace!("Captured loop start state at sample {}", position);
            self.snapshot = Some(states.to_vec());
        }
    }

    /// State to resume from at `target`, if one is known without decoding
    pub fn resume_state(&self, target: u64, current: &[ChannelState]) -> Option<Vec<ChannelState>> {
        let region = self.region?;
        if target != region.start {
            return None;
        }
        if let Some(stored) = &self.stored_history {
            let mut states = current.to_vec();
            for (state, history) in states.iter_mut().zip(stored) {
                state.restore(history);
            }
            return Some(states);
        }
        self.snapshot.clone()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(limit: Option<u32>) -> LoopController {
        LoopController::new(Some(LoopRegion::new(10, 20)), limit, true, None)
    }

    #[test]
    fn test_render_limit_stops_at_loop_end() {
        let looper = controller(None);
        assert_eq!(looper.render_limit(0, 30), 20);
        assert_eq!(looper.render_limit(19, 30), 20);
        assert_eq!(looper.render_limit(20, 30), 30);
    }

    #[test]
    fn test_jump_counts_once() {
        let mut looper = controller(None);
        looper.after_render(15);
        assert!(looper.take_jump().is_none());

        looper.after_render(20);
        assert_eq!(looper.state(20, 30), LoopState::InLoop);
        assert_eq!(looper.take_jump(), Some(10));
        assert!(looper.take_jump().is_none());
        assert_eq!(looper.transitions(), 1);
    }

    #[test]
    fn test_limit_exhausts_loop() {
        let mut looper = controller(Some(1));
        looper.after_render(20);
        looper.take_jump();
        assert!(!looper.looping());
        assert_eq!(looper.render_limit(15, 30), 30);

        looper.after_render(20);
        assert!(!looper.pending_jump());
        assert_eq!(looper.state(25, 30), LoopState::AfterLoopExhausted);
    }

    #[test]
    fn test_states_without_loop() {
        let looper = LoopController::new(None, None, true, None);
        assert_eq!(looper.state(0, 30), LoopState::BeforeLoop);
        assert_eq!(looper.state(30, 30), LoopState::AfterLoopExhausted);
        assert_eq!(looper.render_limit(5, 30), 30);
        assert!(looper.capture_point().is_none());
    }

    #[test]
    fn test_capture_only_at_loop_start() {
        let mut looper = controller(None);
        let states = vec![ChannelState { hist1: 3, ..Default::default() }];

        looper.capture(9, &states);
        assert!(!looper.has_snapshot());
        looper.capture(10, &states);
        assert!(looper.has_snapshot());
        assert!(looper.capture_point().is_none());

        assert_eq!(looper.resume_state(10, &states), Some(states.clone()));
        assert!(looper.resume_state(11, &states).is_none());
    }

    #[test]
    fn test_stored_history_preferred() {
        let stored = vec![ChannelHistory { hist1: 7, hist2: 8, step_index: 0 }];
        let looper = LoopController::new(Some(LoopRegion::new(10, 20)), None, false, Some(stored));
        let current = vec![ChannelState { coefs: Some([1; 16]), ..Default::default() }];

        let resumed = looper.resume_state(10, &current).unwrap();
        assert_eq!(resumed[0].hist1, 7);
        assert_eq!(resumed[0].hist2, 8);
        assert_eq!(resumed[0].coefs, Some([1; 16]));
    }

    #[test]
    fn test_rearm_restores_jump() {
        let mut looper = controller(None);
        looper.after_render(20);
        looper.take_jump();
        looper.rearm();
        assert!(looper.pending_jump());
        assert_eq!(looper.transitions(), 0);
    }
}
