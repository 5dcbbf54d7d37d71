//! Value types shared between the workflows and the Discord boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                $name(v)
            }
        }
    };
}

snowflake!(
    /// Discord message id. Maps runs are keyed by their announcement's id.
    MessageId
);
snowflake!(
    /// Discord user id.
    UserId
);
snowflake!(ChannelId);
snowflake!(RoleId);
snowflake!(GuildId);

impl UserId {
    /// `<@id>` mention markup.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }

    /// Parse `<@123>`, `<@!123>` or a bare id.
    pub fn from_mention(s: &str) -> Option<Self> {
        let s = s.trim();
        let inner = s
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|rest| rest.trim_start_matches('!'))
            .unwrap_or(s);
        inner.parse().ok()
    }
}

/// Rich embed (title + description + side color).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// Interactive button; clicks come back as `InteractionKind::Button { custom_id }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
        }
    }
}

/// A message to post or edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
    pub buttons: Vec<Button>,
    /// Reply target; the platform renders the message as a reply to it.
    pub reference: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reference = Some(message_id);
        self
    }
}

/// A previously posted message, as fetched back from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub content: String,
}

/// A prefix command typed in a guild channel (`!maps_run ...`).
#[derive(Debug, Clone)]
pub struct IncomingCommand {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_roles: Vec<RoleId>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionKind {
    /// A button was clicked.
    Button { custom_id: String },
    /// A modal was submitted; `fields` are `(input custom_id, value)`.
    ModalSubmit {
        custom_id: String,
        fields: Vec<(String, String)>,
    },
}

/// A button click or modal submit.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub kind: InteractionKind,
    pub user_id: UserId,
    pub member_roles: Vec<RoleId>,
    pub channel_id: ChannelId,
    /// Message carrying the clicked component (absent for some modal submits).
    pub message_id: Option<MessageId>,
}

impl Interaction {
    /// Value of a submitted modal input.
    pub fn field(&self, input_id: &str) -> Option<&str> {
        match &self.kind {
            InteractionKind::ModalSubmit { fields, .. } => fields
                .iter()
                .find(|(id, _)| id == input_id)
                .map(|(_, v)| v.as_str()),
            InteractionKind::Button { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

/// How to answer an interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionReply {
    /// Message visible only to the user who interacted.
    Ephemeral(String),
    /// Open a modal form.
    Modal(Modal),
    /// Acknowledge without a visible answer (the message was edited instead).
    Acknowledge,
}
