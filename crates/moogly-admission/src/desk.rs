//! Admission desk: the application workflow from form to role grant.

use std::sync::Arc;

use moogly_core::config::AdmissionConfig;
use moogly_core::error::MooglyError;
use moogly_core::traits::{MemberDirectory, Notifier};
use moogly_core::types::{
    Button, ButtonStyle, ChannelId, InteractionReply, MessageId, Modal, OutgoingMessage,
    TextInput, UserId,
};

use crate::application::{Application, is_valid_ingame_name};
use crate::store::ApplicationStore;

pub const COMPANY_BUTTON_PREFIX: &str = "application:fc:";
pub const APPROVE_BUTTON_PREFIX: &str = "application:approve:";
pub const DECLINE_BUTTON_PREFIX: &str = "application:decline:";
pub const NAME_MODAL_ID: &str = "application:name";
pub const NAME_INPUT_ID: &str = "ingame_name";

const APPROVED_DM: &str = "Your application to get access to Seventh Haven server has been approved, you now have access to the server.";
const DECLINED_DM: &str = "Your application to get access to Seventh Haven server has been declined, please try again.";

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Company '{0}' is not configured")]
    UnknownCompany(String),

    #[error(transparent)]
    Backend(#[from] MooglyError),
}

/// A click on one of the admission buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionAction {
    /// Index into the configured companies.
    ChooseCompany(usize),
    Approve(UserId),
    Decline(UserId),
}

impl AdmissionAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        if let Some(rest) = custom_id.strip_prefix(COMPANY_BUTTON_PREFIX) {
            return rest.parse().ok().map(AdmissionAction::ChooseCompany);
        }
        if let Some(rest) = custom_id.strip_prefix(APPROVE_BUTTON_PREFIX) {
            return rest.parse().ok().map(AdmissionAction::Approve);
        }
        if let Some(rest) = custom_id.strip_prefix(DECLINE_BUTTON_PREFIX) {
            return rest.parse().ok().map(AdmissionAction::Decline);
        }
        None
    }
}

pub struct AdmissionDesk {
    store: Arc<dyn ApplicationStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn MemberDirectory>,
    config: AdmissionConfig,
}

impl AdmissionDesk {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn MemberDirectory>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            config,
        }
    }

    /// The "which FC" form with one button per company.
    pub fn form(&self) -> OutgoingMessage {
        let styles = [ButtonStyle::Primary, ButtonStyle::Success, ButtonStyle::Secondary];
        self.config.companies.iter().enumerate().fold(
            OutgoingMessage::text("Which FC are you member of?"),
            |msg, (i, company)| {
                msg.with_button(Button::new(
                    format!("{COMPANY_BUTTON_PREFIX}{i}"),
                    company.name.clone(),
                    styles[i % styles.len()],
                ))
            },
        )
    }

    /// Company picked: start an application and ask for the in-game name.
    pub async fn choose_company(
        &self,
        user: UserId,
        index: usize,
    ) -> Result<InteractionReply, AdmissionError> {
        let company = self
            .config
            .companies
            .get(index)
            .ok_or_else(|| AdmissionError::UnknownCompany(format!("#{index}")))?;

        if !self
            .store
            .insert_new(&Application::new(user, company.name.clone()))
            .await?
        {
            return Ok(InteractionReply::Ephemeral(
                "You already sent an application, please wait until an administrator reviews it."
                    .into(),
            ));
        }

        tracing::info!("📝 {user} started an application for {}", company.name);
        Ok(InteractionReply::Modal(Modal {
            custom_id: NAME_MODAL_ID.into(),
            title: "Access application".into(),
            inputs: vec![TextInput {
                custom_id: NAME_INPUT_ID.into(),
                label: "What is your in-game name?".into(),
                placeholder: "Name LastName".into(),
            }],
        }))
    }

    /// Name form submitted: record it and post the application for review.
    pub async fn submit_name(
        &self,
        user: UserId,
        name: &str,
    ) -> Result<InteractionReply, AdmissionError> {
        let name = name.trim();
        if !is_valid_ingame_name(name) {
            return Ok(InteractionReply::Ephemeral(
                "Error: Invalid in-game name (format: Name LastName)".into(),
            ));
        }

        if !self.store.set_ingame_name(user, name).await? {
            return Ok(InteractionReply::Ephemeral(
                "Error: no application found, please pick your FC first.".into(),
            ));
        }
        let application = self.store.get(user).await?.ok_or_else(|| {
            MooglyError::NotFound(format!("application of {user} vanished"))
        })?;

        let review = OutgoingMessage::text(format!(
            "New application from {} (ID: {}):\nIn-game name: {}\nFC: {}",
            user.mention(),
            user,
            name,
            application.company
        ))
        .with_button(Button::new(
            format!("{APPROVE_BUTTON_PREFIX}{user}"),
            "Approve",
            ButtonStyle::Success,
        ))
        .with_button(Button::new(
            format!("{DECLINE_BUTTON_PREFIX}{user}"),
            "Decline",
            ButtonStyle::Danger,
        ));
        self.notifier
            .post_announcement(self.config.channel_id, &review)
            .await?;

        tracing::info!("📨 Application of {user} ({name}) posted for review");
        Ok(InteractionReply::Ephemeral(
            "Application sent, awaiting approval...".into(),
        ))
    }

    /// Approve: grant the company role, rename, remove the review message and tell the applicant.
    pub async fn approve(
        &self,
        applicant: UserId,
        review: Option<(ChannelId, MessageId)>,
    ) -> Result<InteractionReply, AdmissionError> {
        let Some(application) = self.store.get(applicant).await? else {
            return Ok(not_found_reply());
        };
        if !self.directory.member_exists(applicant).await? {
            return Ok(InteractionReply::Ephemeral("Error: Failed to fetch user".into()));
        }
        let company = self
            .config
            .company(&application.company)
            .ok_or_else(|| AdmissionError::UnknownCompany(application.company.clone()))?;

        self.store.remove(applicant).await?;
        self.directory.grant_role(applicant, company.role_id).await?;
        if let Some(role) = self.config.applicant_role_id {
            if let Err(e) = self.directory.revoke_role(applicant, role).await {
                tracing::warn!("⚠️ Could not remove applicant role from {applicant}: {e}");
            }
        }
        if let Some(name) = &application.ingame_name {
            if let Err(e) = self.directory.set_display_name(applicant, name).await {
                tracing::warn!("⚠️ Could not rename {applicant} to {name}: {e}");
            }
        }
        self.delete_review(review).await;
        self.notify_applicant(applicant, APPROVED_DM).await;

        tracing::info!("✅ Application of {applicant} approved ({})", company.name);
        Ok(InteractionReply::Ephemeral(format!(
            "Application for {} approved!",
            applicant.mention()
        )))
    }

    /// Decline: drop the application, tell the applicant, remove the review message.
    pub async fn decline(
        &self,
        applicant: UserId,
        review: Option<(ChannelId, MessageId)>,
    ) -> Result<InteractionReply, AdmissionError> {
        if self.store.get(applicant).await?.is_none() {
            return Ok(not_found_reply());
        }
        if !self.directory.member_exists(applicant).await? {
            return Ok(InteractionReply::Ephemeral("Error: Failed to fetch user".into()));
        }

        self.store.remove(applicant).await?;
        self.notify_applicant(applicant, DECLINED_DM).await;
        self.delete_review(review).await;

        tracing::info!("🚫 Application of {applicant} declined");
        Ok(InteractionReply::Ephemeral(format!(
            "Application for {} declined!",
            applicant.mention()
        )))
    }

    /// Drop every pending application.
    pub async fn clear(&self) -> Result<String, AdmissionError> {
        let n = self.store.clear().await?;
        tracing::info!("🧹 Cleared {n} applications");
        Ok("All applications cleared.".into())
    }

    /// Drop the application of the mentioned user.
    pub async fn delete(&self, mention: &str) -> Result<String, AdmissionError> {
        let Some(user) = UserId::from_mention(mention) else {
            return Ok(
                "Error: invalid user argument, format: !application_delete <mention>".into(),
            );
        };
        self.store.remove(user).await?;
        Ok(format!("Application deleted for user {}.", user.mention()))
    }

    async fn delete_review(&self, review: Option<(ChannelId, MessageId)>) {
        if let Some((channel, message)) = review {
            if let Err(e) = self.notifier.delete_announcement(channel, message).await {
                tracing::warn!("⚠️ Could not delete review message {message}: {e}");
            }
        }
    }

    async fn notify_applicant(&self, user: UserId, text: &str) {
        if let Err(e) = self.directory.direct_message(user, text).await {
            tracing::warn!("⚠️ Could not DM {user}: {e}");
        }
    }
}

fn not_found_reply() -> InteractionReply {
    InteractionReply::Ephemeral("Error: user_id not found in applications list!".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryApplicationStore;
    use async_trait::async_trait;
    use moogly_core::config::CompanyConfig;
    use moogly_core::error::Result;
    use moogly_core::types::{Announcement, RoleId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Fake {
        members: Vec<UserId>,
        calls: Mutex<Vec<String>>,
    }

    impl Fake {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Notifier for Fake {
        async fn post_announcement(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageId> {
            self.log(format!("post {channel}: {}", msg.content));
            Ok(MessageId(1))
        }
        async fn edit_announcement(&self, _: ChannelId, _: MessageId, _: &OutgoingMessage) -> Result<()> {
            Ok(())
        }
        async fn delete_announcement(&self, _: ChannelId, id: MessageId) -> Result<()> {
            self.log(format!("delete {id}"));
            Ok(())
        }
        async fn fetch_announcement(&self, _: ChannelId, _: MessageId) -> Result<Option<Announcement>> {
            Ok(None)
        }
        async fn send_message(&self, _: ChannelId, _: &OutgoingMessage) -> Result<MessageId> {
            Ok(MessageId(2))
        }
    }

    #[async_trait]
    impl MemberDirectory for Fake {
        async fn member_exists(&self, user: UserId) -> Result<bool> {
            Ok(self.members.contains(&user))
        }
        async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()> {
            self.log(format!("grant {user} {role}"));
            Ok(())
        }
        async fn revoke_role(&self, user: UserId, role: RoleId) -> Result<()> {
            self.log(format!("revoke {user} {role}"));
            Ok(())
        }
        async fn set_display_name(&self, user: UserId, name: &str) -> Result<()> {
            self.log(format!("nick {user} {name}"));
            Ok(())
        }
        async fn direct_message(&self, user: UserId, text: &str) -> Result<()> {
            self.log(format!("dm {user} {text}"));
            Ok(())
        }
    }

    fn desk(members: Vec<UserId>) -> (AdmissionDesk, Arc<Fake>, Arc<MemoryApplicationStore>) {
        let fake = Arc::new(Fake {
            members,
            ..Default::default()
        });
        let store = Arc::new(MemoryApplicationStore::new());
        let config = AdmissionConfig {
            channel_id: ChannelId(300),
            applicant_role_id: Some(RoleId(9)),
            companies: vec![
                CompanyConfig { name: "Seventh Haven".into(), role_id: RoleId(100) },
                CompanyConfig { name: "Moon".into(), role_id: RoleId(200) },
            ],
        };
        let desk = AdmissionDesk::new(store.clone(), fake.clone(), fake.clone(), config);
        (desk, fake, store)
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(AdmissionAction::parse("application:fc:1"), Some(AdmissionAction::ChooseCompany(1)));
        assert_eq!(AdmissionAction::parse("application:approve:42"), Some(AdmissionAction::Approve(UserId(42))));
        assert_eq!(AdmissionAction::parse("application:decline:42"), Some(AdmissionAction::Decline(UserId(42))));
        assert_eq!(AdmissionAction::parse("application:approve:bob"), None);
        assert_eq!(AdmissionAction::parse("maps_run:join"), None);
    }

    #[test]
    fn test_form_has_a_button_per_company() {
        let (desk, _, _) = desk(vec![]);
        let form = desk.form();
        assert_eq!(form.content, "Which FC are you member of?");
        let labels: Vec<_> = form.buttons.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Seventh Haven", "Moon"]);
        assert_eq!(form.buttons[1].custom_id, "application:fc:1");
    }

    #[tokio::test]
    async fn test_full_approval() {
        let (desk, fake, store) = desk(vec![UserId(7)]);

        let reply = desk.choose_company(UserId(7), 1).await.unwrap();
        assert!(matches!(reply, InteractionReply::Modal(ref m) if m.inputs[0].custom_id == NAME_INPUT_ID));

        let again = desk.choose_company(UserId(7), 0).await.unwrap();
        assert!(matches!(again, InteractionReply::Ephemeral(ref t) if t.starts_with("You already sent")));

        let reply = desk.submit_name(UserId(7), "Aria Moon").await.unwrap();
        assert_eq!(reply, InteractionReply::Ephemeral("Application sent, awaiting approval...".into()));
        assert!(fake.calls()[0].starts_with("post 300: New application from <@7> (ID: 7):"));
        assert!(fake.calls()[0].ends_with("In-game name: Aria Moon\nFC: Moon"));

        let reply = desk
            .approve(UserId(7), Some((ChannelId(300), MessageId(55))))
            .await
            .unwrap();
        assert_eq!(reply, InteractionReply::Ephemeral("Application for <@7> approved!".into()));
        let calls = fake.calls();
        assert!(calls.contains(&"grant 7 200".to_string()));
        assert!(calls.contains(&"revoke 7 9".to_string()));
        assert!(calls.contains(&"nick 7 Aria Moon".to_string()));
        assert!(calls.contains(&"delete 55".to_string()));
        assert!(calls.iter().any(|c| c.starts_with("dm 7 Your application") && c.contains("approved")));
        assert!(store.get(UserId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_name_keeps_application_open() {
        let (desk, fake, store) = desk(vec![UserId(7)]);
        desk.choose_company(UserId(7), 0).await.unwrap();
        let reply = desk.submit_name(UserId(7), "Aria").await.unwrap();
        assert_eq!(
            reply,
            InteractionReply::Ephemeral("Error: Invalid in-game name (format: Name LastName)".into())
        );
        assert!(fake.calls().is_empty());
        assert_eq!(store.get(UserId(7)).await.unwrap().unwrap().ingame_name, None);
    }

    #[tokio::test]
    async fn test_decline() {
        let (desk, fake, store) = desk(vec![UserId(8)]);
        desk.choose_company(UserId(8), 0).await.unwrap();
        desk.submit_name(UserId(8), "Bo Peep").await.unwrap();

        let reply = desk.decline(UserId(8), Some((ChannelId(300), MessageId(56)))).await.unwrap();
        assert_eq!(reply, InteractionReply::Ephemeral("Application for <@8> declined!".into()));
        let calls = fake.calls();
        assert!(calls.iter().any(|c| c.starts_with("dm 8") && c.contains("declined")));
        assert!(calls.contains(&"delete 56".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("grant")));
        assert!(store.get(UserId(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_review_errors() {
        let (desk, _, _) = desk(vec![]);
        assert_eq!(desk.approve(UserId(1), None).await.unwrap(), not_found_reply());

        desk.choose_company(UserId(1), 0).await.unwrap();
        assert_eq!(
            desk.decline(UserId(1), None).await.unwrap(),
            InteractionReply::Ephemeral("Error: Failed to fetch user".into())
        );
    }

    #[tokio::test]
    async fn test_unknown_company_button() {
        let (desk, _, _) = desk(vec![]);
        assert!(matches!(
            desk.choose_company(UserId(1), 5).await,
            Err(AdmissionError::UnknownCompany(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_and_delete() {
        let (desk, _, store) = desk(vec![]);
        desk.choose_company(UserId(1), 0).await.unwrap();
        desk.choose_company(UserId(2), 0).await.unwrap();

        assert_eq!(desk.delete("<@1>").await.unwrap(), "Application deleted for user <@1>.");
        assert!(store.get(UserId(1)).await.unwrap().is_none());
        assert!(desk.delete("someone").await.unwrap().starts_with("Error: invalid user argument"));

        assert_eq!(desk.clear().await.unwrap(), "All applications cleared.");
        assert!(store.get(UserId(2)).await.unwrap().is_none());
    }
}
