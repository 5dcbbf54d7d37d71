//! Maps-run record: the signup state machine for one scheduled run.

use chrono::{DateTime, TimeDelta, Utc};
use moogly_core::types::{MessageId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Default number of slots per run.
pub const DEFAULT_CAPACITY: u32 = 8;

/// Default reminder lead time before the start.
pub const DEFAULT_REMINDER_LEAD_MINUTES: i64 = 20;

/// One scheduled maps run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapsRun {
    /// Id of the announcement message; stable once assigned.
    pub id: MessageId,
    /// Human-facing time label (a Discord timestamp tag). Never used for triggering.
    pub display_time: String,
    /// Start of the run; the reminder time is computed from it.
    pub trigger_time: DateTime<Utc>,
    /// Slots, fixed at creation.
    pub capacity: u32,
    participants: Vec<UserId>,
    notified: bool,
}

/// Where a run stands for signup purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Free slots left, not reminded yet.
    Open,
    /// Every slot taken, not reminded yet.
    Full,
    /// Reminder sent. Terminal: no more joins.
    Reminded,
}

/// Why a join was refused. Expected outcomes, shown only to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    #[error("You have already joined this maps run.")]
    AlreadyJoined,
    #[error("Sorry, this maps run is full.")]
    CapacityExceeded,
    #[error("Signups are closed, this maps run is about to start.")]
    EventLocked,
}

impl MapsRun {
    /// Create a fresh run with an empty roster.
    pub fn new(
        id: MessageId,
        display_time: impl Into<String>,
        trigger_time: DateTime<Utc>,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            display_time: display_time.into(),
            trigger_time,
            capacity,
            participants: Vec::new(),
            notified: false,
        }
    }

    /// Rebuild a run from storage. Duplicate participants are dropped, keeping
    /// the first occurrence.
    pub fn restore(
        id: MessageId,
        display_time: String,
        trigger_time: DateTime<Utc>,
        capacity: u32,
        participants: Vec<UserId>,
        notified: bool,
    ) -> Self {
        let mut roster: Vec<UserId> = Vec::with_capacity(participants.len());
        for user in participants {
            if !roster.contains(&user) {
                roster.push(user);
            }
        }
        if roster.len() > capacity as usize {
            tracing::warn!(
                "⚠️ Maps run {id} stored with {} participants for {capacity} slots",
                roster.len()
            );
        }
        Self {
            id,
            display_time,
            trigger_time,
            capacity,
            participants: roster,
            notified,
        }
    }

    /// Roster in join order.
    pub fn participants(&self) -> &[UserId] {
        &self.participants
    }

    pub fn notified(&self) -> bool {
        self.notified
    }

    /// Free slots.
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.participants.len() as u32)
    }

    pub fn state(&self) -> RunState {
        if self.notified {
            RunState::Reminded
        } else if self.remaining() == 0 {
            RunState::Full
        } else {
            RunState::Open
        }
    }

    /// When the reminder should go out.
    pub fn ping_time(&self, lead: TimeDelta) -> DateTime<Utc> {
        self.trigger_time - lead
    }

    /// Reminder not sent yet and its time has come.
    pub fn is_due(&self, now: DateTime<Utc>, lead: TimeDelta) -> bool {
        !self.notified && now >= self.ping_time(lead)
    }

    /// Add `user` to the roster. Returns the free slots left.
    pub fn join(&mut self, user: UserId) -> Result<u32, JoinRejection> {
        if self.notified {
            return Err(JoinRejection::EventLocked);
        }
        if self.participants.contains(&user) {
            return Err(JoinRejection::AlreadyJoined);
        }
        if self.remaining() == 0 {
            return Err(JoinRejection::CapacityExceeded);
        }
        self.participants.push(user);
        Ok(self.remaining())
    }

    /// Flip `notified` to true. A second call fails and changes nothing.
    pub fn mark_notified(&mut self) -> Result<(), EventError> {
        if self.notified {
            return Err(EventError::AlreadyNotified(self.id));
        }
        self.notified = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(capacity: u32) -> MapsRun {
        MapsRun::new(MessageId(1), "<t:0:F>", Utc::now(), capacity)
    }

    #[test]
    fn test_join_until_full() {
        let mut r = run(2);
        assert_eq!(r.state(), RunState::Open);
        assert_eq!(r.join(UserId(1)), Ok(1));
        assert_eq!(r.join(UserId(2)), Ok(0));
        assert_eq!(r.state(), RunState::Full);
        assert_eq!(r.join(UserId(3)), Err(JoinRejection::CapacityExceeded));
        assert_eq!(r.participants(), &[UserId(1), UserId(2)]);
    }

    #[test]
    fn test_repeat_join_leaves_roster_alone() {
        let mut r = run(4);
        r.join(UserId(7)).unwrap();
        assert_eq!(r.join(UserId(7)), Err(JoinRejection::AlreadyJoined));
        assert_eq!(r.participants(), &[UserId(7)]);
        assert_eq!(r.remaining(), 3);
    }

    #[test]
    fn test_repeat_join_on_full_run_reports_already_joined() {
        let mut r = run(1);
        r.join(UserId(7)).unwrap();
        assert_eq!(r.join(UserId(7)), Err(JoinRejection::AlreadyJoined));
    }

    #[test]
    fn test_locked_after_notify() {
        let mut r = run(4);
        r.join(UserId(1)).unwrap();
        r.mark_notified().unwrap();
        assert_eq!(r.state(), RunState::Reminded);
        assert_eq!(r.join(UserId(2)), Err(JoinRejection::EventLocked));
        assert_eq!(r.join(UserId(1)), Err(JoinRejection::EventLocked));
        assert!(matches!(
            r.mark_notified(),
            Err(EventError::AlreadyNotified(MessageId(1)))
        ));
        assert!(r.notified());
    }

    #[test]
    fn test_zero_capacity() {
        let mut r = run(0);
        assert_eq!(r.state(), RunState::Full);
        assert_eq!(r.join(UserId(1)), Err(JoinRejection::CapacityExceeded));
    }

    #[test]
    fn test_roster_never_exceeds_capacity() {
        // Every capacity 0..5 against a join sequence with repeats.
        let sequence = [1u64, 2, 1, 3, 4, 2, 5, 6, 7, 3, 8];
        for capacity in 0..5 {
            let mut r = run(capacity);
            for (i, user) in sequence.iter().enumerate() {
                let _ = r.join(UserId(*user));
                assert!(r.participants().len() <= capacity as usize);
                if i == 6 {
                    r.mark_notified().unwrap();
                }
            }
        }
    }

    #[test]
    fn test_due_time() {
        let start = Utc::now() + TimeDelta::minutes(25);
        let r = MapsRun::new(MessageId(1), "", start, 8);
        let lead = TimeDelta::minutes(DEFAULT_REMINDER_LEAD_MINUTES);
        assert_eq!(r.ping_time(lead), start - lead);
        assert!(!r.is_due(start - TimeDelta::minutes(21), lead));
        assert!(r.is_due(start - TimeDelta::minutes(20), lead));
        assert!(r.is_due(start + TimeDelta::hours(3), lead));
    }

    #[test]
    fn test_restore_drops_duplicates() {
        let r = MapsRun::restore(
            MessageId(9),
            "x".into(),
            Utc::now(),
            8,
            vec![UserId(3), UserId(1), UserId(3)],
            false,
        );
        assert_eq!(r.participants(), &[UserId(3), UserId(1)]);
    }
}
