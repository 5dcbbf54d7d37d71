//! Event loop: one task per gateway event, answers sent through the `Responder`.

use std::sync::Arc;

use async_trait::async_trait;
use moogly_channels::{DiscordClient, GatewayEvent};
use moogly_core::error::Result;
use moogly_core::traits::Notifier;
use moogly_core::types::{Interaction, InteractionReply};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::routes::Router;

/// Where the router's answers go: plain messages via `Notifier`, interaction
/// answers via the callback endpoint.
#[async_trait]
pub trait Responder: Notifier {
    async fn respond(&self, interaction: &Interaction, reply: &InteractionReply) -> Result<()>;
}

#[async_trait]
impl Responder for DiscordClient {
    async fn respond(&self, interaction: &Interaction, reply: &InteractionReply) -> Result<()> {
        DiscordClient::respond(self, interaction, reply).await
    }
}

/// Dispatch events until `shutdown` fires or the listener goes away, then wait
/// for in-flight handlers.
pub async fn serve(
    router: Arc<Router>,
    responder: Arc<dyn Responder>,
    mut events: mpsc::Receiver<GatewayEvent>,
    shutdown: CancellationToken,
) {
    let mut tasks = JoinSet::new();
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let router = router.clone();
        let responder = responder.clone();
        tasks.spawn(async move { handle(&router, responder.as_ref(), event).await });

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!("❌ Event handler panicked: {e}");
            }
        }
    }

    if !tasks.is_empty() {
        tracing::info!("⏳ Waiting for {} in-flight handlers", tasks.len());
    }
    while tasks.join_next().await.is_some() {}
}

async fn handle(router: &Router, responder: &dyn Responder, event: GatewayEvent) {
    match event {
        GatewayEvent::Command(cmd) => {
            let Some(reply) = router.handle_command(&cmd).await else {
                return;
            };
            if let Err(e) = responder.send_message(cmd.channel_id, &reply).await {
                tracing::warn!("⚠️ Could not answer command in {}: {e}", cmd.channel_id);
            }
        }
        GatewayEvent::Interaction(interaction) => {
            let reply = router.handle_interaction(&interaction).await;
            if let Err(e) = responder.respond(&interaction, &reply).await {
                tracing::warn!("⚠️ Could not answer interaction {}: {e}", interaction.id);
            }
        }
    }
}
