//! Command and interaction routing.

use std::sync::Arc;

use moogly_admission::desk::{NAME_INPUT_ID, NAME_MODAL_ID};
use moogly_admission::{AdmissionAction, AdmissionDesk};
use moogly_core::types::{
    IncomingCommand, Interaction, InteractionKind, InteractionReply, MessageId, OutgoingMessage,
    RoleId, UserId,
};
use moogly_scheduler::render::{JOIN_BUTTON_ID, roster_mentions};
use moogly_scheduler::{EventController, EventError, JoinOutcome};

const NO_PERMISSION: &str = "You don't have permission to use this command.";
const SOMETHING_WENT_WRONG: &str = "Oops! Something went wrong. Please try again";

pub struct Router {
    prefix: String,
    admin_role: RoleId,
    events: Arc<EventController>,
    admission: Arc<AdmissionDesk>,
}

impl Router {
    pub fn new(
        prefix: impl Into<String>,
        admin_role: RoleId,
        events: Arc<EventController>,
        admission: Arc<AdmissionDesk>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            admin_role,
            events,
            admission,
        }
    }

    fn is_admin(&self, roles: &[RoleId]) -> bool {
        roles.contains(&self.admin_role)
    }

    /// Handle a prefix command. `None` when the message is not a command of ours.
    pub async fn handle_command(&self, cmd: &IncomingCommand) -> Option<OutgoingMessage> {
        let body = cmd.content.trim().strip_prefix(self.prefix.as_str())?;
        let mut parts = body.split_whitespace();
        let name = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let known = matches!(
            name,
            "maps_run" | "maps_list" | "application_form" | "application_clear" | "application_delete"
        );
        if !known {
            return None;
        }
        tracing::debug!("Command {name} from {}", cmd.author_id);

        if !self.is_admin(&cmd.author_roles) {
            tracing::info!("🚫 {} tried {name} without the admin role", cmd.author_id);
            return Some(reply_to(cmd, NO_PERMISSION));
        }

        let text = match name {
            "maps_run" => self.maps_run(&args).await,
            "maps_list" => self.maps_list(&args).await,
            "application_form" => return Some(self.admission.form()),
            "application_clear" => self.admission_text(self.admission.clear().await),
            _ => {
                let mention = args.first().copied().unwrap_or_default();
                self.admission_text(self.admission.delete(mention).await)
            }
        };
        Some(reply_to(cmd, text))
    }

    async fn maps_run(&self, args: &[&str]) -> String {
        let (timestamp, capacity) = split_capacity(args);
        if timestamp.is_empty() {
            return format!("Usage: {}maps_run <timestamp> [capacity]", self.prefix);
        }
        if capacity == Some(0) {
            return "Capacity must be at least 1.".into();
        }

        match self.events.create_event(&timestamp, capacity).await {
            Ok(run) => format!(
                "Maps run {} created for {} ({} slots).",
                run.id, run.display_time, run.capacity
            ),
            Err(e @ EventError::InvalidTimestamp(_)) => e.to_string(),
            Err(e) => {
                tracing::error!("❌ Could not create maps run: {e}");
                SOMETHING_WENT_WRONG.into()
            }
        }
    }

    async fn maps_list(&self, args: &[&str]) -> String {
        let Some(id) = args.first().and_then(|a| a.parse::<MessageId>().ok()) else {
            return format!("Usage: {}maps_list <event id>", self.prefix);
        };
        match self.events.list_participants(id).await {
            Ok(roster) if roster.is_empty() => format!("No one has joined maps run {id} yet."),
            Ok(roster) => format!(
                "Participants of maps run {id} ({}): {}",
                roster.len(),
                roster_mentions(&roster)
            ),
            Err(e @ (EventError::EventNotFound(_) | EventError::SourceMessageNotFound(_))) => {
                e.to_string()
            }
            Err(e) => {
                tracing::error!("❌ Could not list maps run {id}: {e}");
                SOMETHING_WENT_WRONG.into()
            }
        }
    }

    fn admission_text(&self, result: Result<String, moogly_admission::AdmissionError>) -> String {
        result.unwrap_or_else(|e| {
            tracing::error!("❌ Admission command failed: {e}");
            SOMETHING_WENT_WRONG.into()
        })
    }

    /// Handle a button click or modal submit.
    pub async fn handle_interaction(&self, interaction: &Interaction) -> InteractionReply {
        match &interaction.kind {
            InteractionKind::Button { custom_id } if custom_id == JOIN_BUTTON_ID => {
                self.join(interaction).await
            }
            InteractionKind::Button { custom_id } => match AdmissionAction::parse(custom_id) {
                Some(action) => self.admission_action(interaction, action).await,
                None => {
                    tracing::debug!("Ignoring unknown button {custom_id}");
                    InteractionReply::Acknowledge
                }
            },
            InteractionKind::ModalSubmit { custom_id, .. } if custom_id == NAME_MODAL_ID => {
                let name = interaction.field(NAME_INPUT_ID).unwrap_or_default();
                admission_reply(self.admission.submit_name(interaction.user_id, name).await)
            }
            InteractionKind::ModalSubmit { custom_id, .. } => {
                tracing::debug!("Ignoring unknown modal {custom_id}");
                InteractionReply::Acknowledge
            }
        }
    }

    async fn join(&self, interaction: &Interaction) -> InteractionReply {
        let Some(id) = interaction.message_id else {
            return InteractionReply::Ephemeral("This maps run no longer exists.".into());
        };
        let text = match self.events.join(id, interaction.user_id).await {
            Ok(JoinOutcome::Joined { remaining, .. }) => {
                format!("You joined the maps run! {remaining} slots left.")
            }
            Ok(JoinOutcome::Rejected(rejection)) => rejection.to_string(),
            Err(EventError::EventNotFound(_)) => "This maps run no longer exists.".into(),
            Err(e) => {
                tracing::error!("❌ Join of {} to maps run {id} failed: {e}", interaction.user_id);
                SOMETHING_WENT_WRONG.into()
            }
        };
        InteractionReply::Ephemeral(text)
    }

    async fn admission_action(
        &self,
        interaction: &Interaction,
        action: AdmissionAction,
    ) -> InteractionReply {
        let user = interaction.user_id;
        let review = interaction
            .message_id
            .map(|message| (interaction.channel_id, message));
        match action {
            AdmissionAction::ChooseCompany(index) => {
                admission_reply(self.admission.choose_company(user, index).await)
            }
            AdmissionAction::Approve(_) | AdmissionAction::Decline(_)
                if !self.is_admin(&interaction.member_roles) =>
            {
                InteractionReply::Ephemeral(NO_PERMISSION.into())
            }
            AdmissionAction::Approve(applicant) => {
                log_review(user, applicant, "approve");
                admission_reply(self.admission.approve(applicant, review).await)
            }
            AdmissionAction::Decline(applicant) => {
                log_review(user, applicant, "decline");
                admission_reply(self.admission.decline(applicant, review).await)
            }
        }
    }
}

fn log_review(reviewer: UserId, applicant: UserId, verdict: &str) {
    tracing::info!("🗂️ {reviewer} chose to {verdict} the application of {applicant}");
}

fn admission_reply(
    result: Result<InteractionReply, moogly_admission::AdmissionError>,
) -> InteractionReply {
    result.unwrap_or_else(|e| {
        tracing::error!("❌ Admission interaction failed: {e}");
        InteractionReply::Ephemeral(SOMETHING_WENT_WRONG.into())
    })
}

fn reply_to(cmd: &IncomingCommand, text: impl Into<String>) -> OutgoingMessage {
    OutgoingMessage::text(text).replying_to(cmd.message_id)
}

/// `<timestamp...> [capacity]`: a trailing integer is the capacity when
/// something precedes it.
fn split_capacity(args: &[&str]) -> (String, Option<u32>) {
    if let [head @ .., last] = args {
        if !head.is_empty() {
            if let Ok(capacity) = last.parse::<u32>() {
                return (head.join(" "), Some(capacity));
            }
        }
    }
    (args.join(" "), None)
}
