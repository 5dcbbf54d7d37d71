//! Message composition for announcements, reminders and operator alerts.

use chrono::TimeDelta;
use moogly_core::types::{Button, ButtonStyle, Embed, OutgoingMessage, UserId};

use crate::event::{MapsRun, RunState};
use crate::timestamp::relative_tag;

/// `custom_id` of the Join button. The run is identified by the message it sits on.
pub const JOIN_BUTTON_ID: &str = "maps_run:join";

const ANNOUNCE_COLOR: u32 = 0x00AAFF;
const REMINDER_COLOR: u32 = 0xFF0000;
const ALERT_COLOR: u32 = 0xFF8800;

/// Space-separated mentions, in join order.
pub fn roster_mentions(users: &[UserId]) -> String {
    users
        .iter()
        .map(UserId::mention)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The run's announcement. The Join button is dropped once the reminder went out.
pub fn announcement(run: &MapsRun) -> OutgoingMessage {
    let joined = if run.participants().is_empty() {
        "Nobody yet".to_string()
    } else {
        roster_mentions(run.participants())
    };
    let status = match run.state() {
        RunState::Open => format!("{}/{} slots left", run.remaining(), run.capacity),
        RunState::Full => "Full".to_string(),
        RunState::Reminded => "Signups closed".to_string(),
    };

    let message = OutgoingMessage::default().with_embed(Embed {
        title: "Maps Run".into(),
        description: format!(
            "Starts {} ({})\n{}\nJoined: {}",
            run.display_time,
            relative_tag(run.trigger_time),
            status,
            joined
        ),
        color: ANNOUNCE_COLOR,
    });

    if run.state() == RunState::Reminded {
        message
    } else {
        message.with_button(Button::new(JOIN_BUTTON_ID, "Join", ButtonStyle::Success))
    }
}

/// Pre-start reminder, posted as a reply to the announcement.
pub fn reminder(run: &MapsRun, lead: TimeDelta) -> OutgoingMessage {
    OutgoingMessage::default()
        .with_embed(Embed {
            title: "Maps Run Reminder".into(),
            description: format!(
                "The maps run will start in {} minutes. Are you ready?\nJoined Users: {}",
                lead.num_minutes(),
                roster_mentions(run.participants())
            ),
            color: REMINDER_COLOR,
        })
        .replying_to(run.id)
}

/// Operator alert for a reminder that keeps failing.
pub fn delivery_alert(run: &MapsRun, failed_ticks: u32, reason: &str) -> OutgoingMessage {
    OutgoingMessage::default().with_embed(Embed {
        title: "Maps Run Reminder Stuck".into(),
        description: format!(
            "The reminder for maps run {} ({}) failed {failed_ticks} times in a row and was parked until restart.\nLast error: {reason}",
            run.id, run.display_time
        ),
        color: ALERT_COLOR,
    })
}
