use serde::Serialize;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RobStats {
    accepted: u64,
    completed: u64,
    unmatched_responses: u64,
    full_stalls: u64,
    bottom_send_stalls: u64,
    top_send_stalls: u64,
    discards: u64,
    restarts: u64,
    max_occupancy: u64,
}

impl RobStats {
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn unmatched_responses(&self) -> u64 {
        self.unmatched_responses
    }

    pub fn full_stalls(&self) -> u64 {
        self.full_stalls
    }

    pub fn bottom_send_stalls(&self) -> u64 {
        self.bottom_send_stalls
    }

    pub fn top_send_stalls(&self) -> u64 {
        self.top_send_stalls
    }

    pub fn discards(&self) -> u64 {
        self.discards
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn max_occupancy(&self) -> u64 {
        self.max_occupancy
    }

    pub fn record_accept(&mut self, occupancy: usize) {
        self.accepted = self.accepted.saturating_add(1);
        self.max_occupancy = self.max_occupancy.max(occupancy as u64);
    }

    pub fn record_complete(&mut self) {
        self.completed = self.completed.saturating_add(1);
    }

    pub fn record_unmatched(&mut self) {
        self.unmatched_responses = self.unmatched_responses.saturating_add(1);
    }

    pub fn record_full_stall(&mut self) {
        self.full_stalls = self.full_stalls.saturating_add(1);
    }

    pub fn record_bottom_send_stall(&mut self) {
        self.bottom_send_stalls = self.bottom_send_stalls.saturating_add(1);
    }

    pub fn record_top_send_stall(&mut self) {
        self.top_send_stalls = self.top_send_stalls.saturating_add(1);
    }

    pub fn record_discard(&mut self) {
        self.discards = self.discards.saturating_add(1);
    }

    pub fn record_restart(&mut self) {
        self.restarts = self.restarts.saturating_add(1);
    }
}

impl AddAssign<&RobStats> for RobStats {
    fn add_assign(&mut self, other: &RobStats) {
        self.accepted = self.accepted.saturating_add(other.accepted);
        self.completed = self.completed.saturating_add(other.completed);
        self.unmatched_responses = self
            .unmatched_responses
            .saturating_add(other.unmatched_responses);
        self.full_stalls = self.full_stalls.saturating_add(other.full_stalls);
        self.bottom_send_stalls = self
            .bottom_send_stalls
            .saturating_add(other.bottom_send_stalls);
        self.top_send_stalls = self.top_send_stalls.saturating_add(other.top_send_stalls);
        self.discards = self.discards.saturating_add(other.discards);
        self.restarts = self.restarts.saturating_add(other.restarts);
        self.max_occupancy = self.max_occupancy.max(other.max_occupancy);
    }
}
