//! Reminder schedule during the cooling-off period.

use crate::types::DeletionRequest;
use serde::Serialize;
use warden_crypto::DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reminder {
    Day1,
    Day3,
    Day6,
}

impl Reminder {
    pub const ALL: [Reminder; 3] = [Reminder::Day1, Reminder::Day3, Reminder::Day6];

    pub fn day(self) -> u64 {
        match self {
            Reminder::Day1 => 1,
            Reminder::Day3 => 3,
            Reminder::Day6 => 6,
        }
    }

    pub fn due_at(self, requested_at: u64) -> u64 {
        requested_at + self.day() * DAY
    }

    pub fn is_sent(self, request: &DeletionRequest) -> bool {
        match self {
            Reminder::Day1 => request.reminder_1_sent,
            Reminder::Day3 => request.reminder_3_sent,
            Reminder::Day6 => request.reminder_6_sent,
        }
    }

    pub fn mark_sent(self, request: &mut DeletionRequest) {
        match self {
            Reminder::Day1 => request.reminder_1_sent = true,
            Reminder::Day3 => request.reminder_3_sent = true,
            Reminder::Day6 => request.reminder_6_sent = true,
        }
    }
}

/// Unsent reminders whose time has come, earliest first.
///
/// Nothing is due once the request left `pending` or reached its deadline.
pub fn due_reminders(request: &DeletionRequest, now: u64) -> Vec<Reminder> {
    if !request.is_pending() || now >= request.scheduled_for {
        return Vec::new();
    }
    Reminder::ALL
        .into_iter()
        .filter(|r| !r.is_sent(request) && r.due_at(request.requested_at) <= now)
        .collect()
}
