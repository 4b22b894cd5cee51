//! Discord adapter (serenity).
//!
//! This crate implements the `classbot-core` capability ports over the
//! Discord REST + gateway APIs.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use serenity::all::{
    ChannelType, Context, CreateChannel, Http, PermissionOverwrite, PermissionOverwriteType,
    Permissions, ReactionType, ShardMessenger,
};
use serenity::collector::MessageCollector;

pub mod handlers;
pub mod router;

use classbot_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::{ChannelMutator, MessageWaiter},
        types::{Access, AccessRule, AccessSubject, ChannelBlueprint, ChannelInfo, ChannelKind, IncomingMessage},
    },
    Result,
};

/// Both capability ports over one gateway connection.
///
/// Built per event from the handler context; the heavy state (HTTP client,
/// shard handle) is reference-counted inside serenity.
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
    shard: ShardMessenger,
}

impl DiscordGateway {
    pub fn new(ctx: &Context) -> Self {
        Self {
            http: ctx.http.clone(),
            shard: ctx.shard.clone(),
        }
    }

    pub(crate) fn ds_guild(guild: GuildId) -> serenity::all::GuildId {
        serenity::all::GuildId::new(guild.0)
    }

    pub(crate) fn ds_channel(channel: ChannelId) -> serenity::all::ChannelId {
        serenity::all::ChannelId::new(channel.0)
    }

    pub(crate) fn ds_message(message: MessageId) -> serenity::all::MessageId {
        serenity::all::MessageId::new(message.0)
    }

    pub(crate) fn ds_user(user: UserId) -> serenity::all::UserId {
        serenity::all::UserId::new(user.0)
    }

    pub(crate) fn map_err(e: serenity::Error) -> Error {
        Error::Platform(format!("discord error: {e}"))
    }

    /// The fixed capability triple the bot manages on class channels.
    fn access_permissions() -> Permissions {
        Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY
    }

    fn overwrite(guild: GuildId, rule: &AccessRule) -> PermissionOverwrite {
        let (allow, deny) = match rule.access {
            Access::Allow => (Self::access_permissions(), Permissions::empty()),
            Access::Deny => (Permissions::empty(), Self::access_permissions()),
        };
        let kind = match rule.subject {
            AccessSubject::Member(user) => PermissionOverwriteType::Member(Self::ds_user(user)),
            // The default role shares the guild's id.
            AccessSubject::Everyone => {
                PermissionOverwriteType::Role(serenity::all::RoleId::new(guild.0))
            }
        };
        PermissionOverwrite { allow, deny, kind }
    }
}

#[async_trait]
impl ChannelMutator for DiscordGateway {
    async fn create_channel(
        &self,
        guild: GuildId,
        blueprint: ChannelBlueprint,
    ) -> Result<ChannelId> {
        let kind = match blueprint.kind {
            ChannelKind::Text => ChannelType::Text,
            ChannelKind::Category => ChannelType::Category,
        };
        let overwrites: Vec<PermissionOverwrite> = blueprint
            .overwrites
            .iter()
            .map(|rule| Self::overwrite(guild, rule))
            .collect();

        let mut create = CreateChannel::new(blueprint.name)
            .kind(kind)
            .permissions(overwrites);
        if let Some(parent) = blueprint.parent {
            create = create.category(Self::ds_channel(parent));
        }

        let channel = Self::ds_guild(guild)
            .create_channel(&self.http, create)
            .await
            .map_err(Self::map_err)?;
        Ok(ChannelId(channel.id.get()))
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        Self::ds_channel(channel)
            .delete(&self.http)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_member_access(
        &self,
        channel: ChannelId,
        user: UserId,
        access: Access,
    ) -> Result<()> {
        let (allow, deny) = match access {
            Access::Allow => (Self::access_permissions(), Permissions::empty()),
            Access::Deny => (Permissions::empty(), Self::access_permissions()),
        };
        let overwrite = PermissionOverwrite {
            allow,
            deny,
            kind: PermissionOverwriteType::Member(Self::ds_user(user)),
        };
        Self::ds_channel(channel)
            .create_permission(&self.http, overwrite)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        let channels = Self::ds_guild(guild)
            .channels(&self.http)
            .await
            .map_err(Self::map_err)?;

        Ok(channels
            .into_values()
            .filter_map(|c| {
                let kind = match c.kind {
                    ChannelType::Text => ChannelKind::Text,
                    ChannelType::Category => ChannelKind::Category,
                    _ => return None,
                };
                Some(ChannelInfo {
                    id: ChannelId(c.id.get()),
                    name: c.name.clone(),
                    kind,
                    parent: c.parent_id.map(|p| ChannelId(p.get())),
                })
            })
            .collect())
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        let msg = Self::ds_channel(channel)
            .say(&self.http, text)
            .await
            .map_err(Self::map_err)?;
        Ok(MessageRef {
            channel_id: channel,
            message_id: MessageId(msg.id.get()),
        })
    }

    async fn pin_message(&self, msg: MessageRef) -> Result<()> {
        Self::ds_channel(msg.channel_id)
            .pin(&self.http, Self::ds_message(msg.message_id))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn remove_reaction(&self, msg: MessageRef, user: UserId, emoji: &str) -> Result<()> {
        Self::ds_channel(msg.channel_id)
            .delete_reaction(
                &self.http,
                Self::ds_message(msg.message_id),
                Some(Self::ds_user(user)),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl MessageWaiter for DiscordGateway {
    async fn next_message(
        &self,
        channel: ChannelId,
        author: UserId,
        timeout: Duration,
    ) -> Result<Option<IncomingMessage>> {
        let msg = MessageCollector::new(&self.shard)
            .channel_id(Self::ds_channel(channel))
            .author_id(Self::ds_user(author))
            .timeout(timeout)
            .await;

        Ok(msg.map(|m| IncomingMessage {
            author,
            content: m.content.clone(),
        }))
    }
}
