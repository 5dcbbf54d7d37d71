//! Discord REST client for messages, interaction callbacks, members and DMs.

use async_trait::async_trait;
use moogly_core::error::{MooglyError, Result};
use moogly_core::traits::{MemberDirectory, Notifier};
use moogly_core::types::{
    Announcement, ButtonStyle, ChannelId, GuildId, Interaction, InteractionReply, MessageId,
    OutgoingMessage, RoleId, UserId,
};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use super::{API_BASE, snowflake};

/// Discord allows at most five buttons per action row.
const BUTTONS_PER_ROW: usize = 5;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Bot client for one guild.
pub struct DiscordClient {
    client: reqwest::Client,
    token: String,
    guild_id: GuildId,
    api_base: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, guild_id: GuildId) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            guild_id,
            api_base: API_BASE.to_string(),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Websocket URL for the gateway listener.
    pub async fn gateway_url(&self) -> Result<String> {
        let body = self
            .request(Method::GET, "/gateway/bot", None)
            .await?
            .unwrap_or_default();
        body["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MooglyError::Gateway("No gateway URL in /gateway/bot".into()))
    }

    /// Answer a button click or modal submit.
    pub async fn respond(&self, interaction: &Interaction, reply: &InteractionReply) -> Result<()> {
        let path = format!(
            "/interactions/{}/{}/callback",
            interaction.id, interaction.token
        );
        self.request(Method::POST, &path, Some(&interaction_response(reply)))
            .await?;
        Ok(())
    }

    /// Send one request, waiting out rate limits. 404 maps to `NotFound`;
    /// an empty body (204) gives `None`.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;
        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token))
                .header("User-Agent", concat!("DiscordBot (moogly, ", env!("CARGO_PKG_VERSION"), ")"));
            if let Some(body) = body {
                req = req.json(body);
            }

            let response = req
                .send()
                .await
                .map_err(|e| MooglyError::Channel(format!("Discord {method} {path} failed: {e}")))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                attempt += 1;
                let retry_after = response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|b| b["retry_after"].as_f64())
                    .unwrap_or(1.0);
                tracing::debug!("Discord rate limit on {path}, retrying in {retry_after}s");
                tokio::time::sleep(std::time::Duration::from_secs_f64(retry_after)).await;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(MooglyError::NotFound(format!("{method} {path}")));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(MooglyError::Channel(format!(
                    "Discord {method} {path} returned {status}: {text}"
                )));
            }
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }
            let value = response
                .json::<Value>()
                .await
                .map_err(|e| MooglyError::Channel(format!("Invalid Discord response: {e}")))?;
            return Ok(Some(value));
        }
    }

    async fn post_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageId> {
        let body = self
            .request(
                Method::POST,
                &format!("/channels/{channel}/messages"),
                Some(&message_payload(msg)),
            )
            .await?
            .unwrap_or_default();
        snowflake(&body["id"])
            .ok_or_else(|| MooglyError::Channel("Discord returned a message without id".into()))
    }

    fn member_path(&self, user: UserId) -> String {
        format!("/guilds/{}/members/{}", self.guild_id, user)
    }
}

#[async_trait]
impl Notifier for DiscordClient {
    async fn post_announcement(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageId> {
        self.post_message(channel, msg).await
    }

    async fn edit_announcement(
        &self,
        channel: ChannelId,
        id: MessageId,
        msg: &OutgoingMessage,
    ) -> Result<()> {
        self.request(
            Method::PATCH,
            &format!("/channels/{channel}/messages/{id}"),
            Some(&message_payload(msg)),
        )
        .await?;
        Ok(())
    }

    async fn delete_announcement(&self, channel: ChannelId, id: MessageId) -> Result<()> {
        self.request(Method::DELETE, &format!("/channels/{channel}/messages/{id}"), None)
            .await?;
        Ok(())
    }

    async fn fetch_announcement(&self, channel: ChannelId, id: MessageId) -> Result<Option<Announcement>> {
        match self
            .request(Method::GET, &format!("/channels/{channel}/messages/{id}"), None)
            .await
        {
            Ok(body) => Ok(body.map(|b| Announcement {
                id,
                channel_id: channel,
                content: b["content"].as_str().unwrap_or_default().to_string(),
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageId> {
        self.post_message(channel, msg).await
    }
}

#[async_trait]
impl MemberDirectory for DiscordClient {
    async fn member_exists(&self, user: UserId) -> Result<bool> {
        match self.request(Method::GET, &self.member_path(user), None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<()> {
        let path = format!("{}/roles/{role}", self.member_path(user));
        self.request(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn revoke_role(&self, user: UserId, role: RoleId) -> Result<()> {
        let path = format!("{}/roles/{role}", self.member_path(user));
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn set_display_name(&self, user: UserId, name: &str) -> Result<()> {
        self.request(Method::PATCH, &self.member_path(user), Some(&json!({ "nick": name })))
            .await?;
        Ok(())
    }

    async fn direct_message(&self, user: UserId, text: &str) -> Result<()> {
        let dm = self
            .request(
                Method::POST,
                "/users/@me/channels",
                Some(&json!({ "recipient_id": user.to_string() })),
            )
            .await?
            .unwrap_or_default();
        let channel: ChannelId = snowflake(&dm["id"])
            .ok_or_else(|| MooglyError::Channel(format!("No DM channel for {user}")))?;
        self.post_message(channel, &OutgoingMessage::text(text)).await?;
        Ok(())
    }
}

fn button_style(style: ButtonStyle) -> u8 {
    match style {
        ButtonStyle::Primary => 1,
        ButtonStyle::Secondary => 2,
        ButtonStyle::Success => 3,
        ButtonStyle::Danger => 4,
    }
}

/// JSON body for create/edit message.
pub fn message_payload(msg: &OutgoingMessage) -> Value {
    let embeds: Vec<Value> = msg
        .embeds
        .iter()
        .map(|e| {
            json!({
                "title": e.title,
                "description": e.description,
                "color": e.color,
            })
        })
        .collect();

    let components: Vec<Value> = msg
        .buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            let buttons: Vec<Value> = row
                .iter()
                .map(|b| {
                    json!({
                        "type": 2,
                        "style": button_style(b.style),
                        "label": b.label,
                        "custom_id": b.custom_id,
                    })
                })
                .collect();
            json!({ "type": 1, "components": buttons })
        })
        .collect();

    let mut payload = json!({
        "content": msg.content,
        "embeds": embeds,
        "components": components,
        "allowed_mentions": { "parse": ["users"] },
    });
    if let Some(reference) = msg.reference {
        payload["message_reference"] = json!({
            "message_id": reference.to_string(),
            "fail_if_not_exists": false,
        });
    }
    payload
}

/// JSON body for an interaction callback.
pub fn interaction_response(reply: &InteractionReply) -> Value {
    match reply {
        InteractionReply::Ephemeral(text) => json!({
            "type": 4,
            "data": { "content": text, "flags": EPHEMERAL_FLAG },
        }),
        InteractionReply::Modal(modal) => {
            let rows: Vec<Value> = modal
                .inputs
                .iter()
                .map(|input| {
                    json!({
                        "type": 1,
                        "components": [{
                            "type": 4,
                            "custom_id": input.custom_id,
                            "label": input.label,
                            "placeholder": input.placeholder,
                            "style": 1,
                            "required": true,
                        }],
                    })
                })
                .collect();
            json!({
                "type": 9,
                "data": {
                    "custom_id": modal.custom_id,
                    "title": modal.title,
                    "components": rows,
                },
            })
        }
        InteractionReply::Acknowledge => json!({ "type": 6 }),
    }
}
