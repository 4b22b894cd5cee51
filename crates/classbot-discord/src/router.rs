use std::sync::Arc;

use serenity::all::{Client, Context, EventHandler, GatewayIntents, Interaction, Member, Reaction, Ready};
use tokio::sync::RwLock;

use classbot_core::{
    audit::AuditLogger,
    config::Config,
    domain::{ChannelId, MessageId, MessageRef},
    enrollment::SessionRegistry,
    relay::CompletionClient,
};

use crate::handlers;
use crate::DiscordGateway;

/// Shared state assembled once at startup and passed into every handler,
/// in place of ad-hoc globals.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub audit: Arc<AuditLogger>,
    pub completion: Option<Arc<dyn CompletionClient>>,
    pub announcements: RwLock<Option<AnnouncementCache>>,
}

/// The announcement messages members react to, resolved once at startup.
#[derive(Clone, Copy, Debug)]
pub struct AnnouncementCache {
    pub add_classes: MessageRef,
    pub get_started: Option<MessageRef>,
}

struct Handler {
    state: Arc<AppState>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("logged in as {}", ready.user.tag());

        match cache_announcements(&ctx, &self.state).await {
            Ok(cache) => {
                *self.state.announcements.write().await = Some(cache);
            }
            Err(e) => {
                tracing::error!("failed to resolve announcement messages: {e}");
            }
        }

        if let Err(e) = handlers::commands::register(&ctx, &self.state.cfg).await {
            tracing::error!("failed to register commands: {e}");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        handlers::handle_member_join(ctx, member, self.state.clone()).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        handlers::handle_reaction(ctx, reaction, self.state.clone()).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(cmd) = interaction {
            handlers::commands::dispatch(ctx, cmd, self.state.clone()).await;
        }
    }
}

/// Connect to the gateway and dispatch events until the process stops.
pub async fn run_gateway(
    cfg: Arc<Config>,
    completion: Option<Arc<dyn CompletionClient>>,
) -> anyhow::Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        registry: Arc::new(SessionRegistry::default()),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
        completion,
        announcements: RwLock::new(None),
    });

    tracing::info!("managing guild {}", cfg.guild_id.0);
    if !cfg.help_available {
        tracing::info!("no completion API key configured; /help will be unavailable");
    }

    let mut client = Client::builder(&cfg.discord_bot_token, intents)
        .event_handler(Handler { state })
        .await?;

    client.start().await?;
    Ok(())
}

/// Fetch the configured announcement messages so reaction events can be
/// matched against real, existing messages.
async fn cache_announcements(ctx: &Context, state: &AppState) -> anyhow::Result<AnnouncementCache> {
    let cfg = &state.cfg;
    let channel = DiscordGateway::ds_channel(cfg.announce_channel_id);

    let add_classes = channel
        .message(&ctx.http, DiscordGateway::ds_message(cfg.add_classes_message_id))
        .await?;

    let mut get_started = None;
    if let Some(id) = cfg.get_started_message_id {
        let msg = channel
            .message(&ctx.http, DiscordGateway::ds_message(id))
            .await?;
        get_started = Some(MessageRef {
            channel_id: cfg.announce_channel_id,
            message_id: MessageId(msg.id.get()),
        });
    }

    tracing::info!(
        "cached announcement messages in channel {}",
        cfg.announce_channel_id.0
    );

    Ok(AnnouncementCache {
        add_classes: MessageRef {
            channel_id: ChannelId(add_classes.channel_id.get()),
            message_id: MessageId(add_classes.id.get()),
        },
        get_started,
    })
}
