use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GuildId, MessageRef, UserId},
    messaging::types::{Access, ChannelBlueprint, ChannelInfo, IncomingMessage},
    Result,
};

/// Channel and permission mutation capability.
///
/// Discord is the first implementation; the dialogue and the group lifecycle
/// manager only ever talk to this trait, so both can run against an in-memory
/// fake in tests.
#[async_trait]
pub trait ChannelMutator: Send + Sync {
    /// Create a channel or category; the platform assigns and returns its id.
    async fn create_channel(&self, guild: GuildId, blueprint: ChannelBlueprint)
        -> Result<ChannelId>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<()>;

    /// Set this member's view/send/history entry on a channel. Last writer
    /// wins on the platform side, which makes repeated grants idempotent.
    async fn set_member_access(
        &self,
        channel: ChannelId,
        user: UserId,
        access: Access,
    ) -> Result<()>;

    /// All channels of the guild, in platform-returned order.
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>>;

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef>;

    async fn pin_message(&self, msg: MessageRef) -> Result<()>;

    /// Remove one user's reaction from a message (unicode emoji).
    async fn remove_reaction(&self, msg: MessageRef, user: UserId, emoji: &str) -> Result<()>;
}

/// Bounded wait for the next message from one member in one channel.
///
/// `Ok(None)` means the deadline passed with no matching message; there is no
/// separate cancellation path.
#[async_trait]
pub trait MessageWaiter: Send + Sync {
    async fn next_message(
        &self,
        channel: ChannelId,
        author: UserId,
        timeout: Duration,
    ) -> Result<Option<IncomingMessage>>;
}
