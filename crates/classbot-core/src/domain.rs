/// Discord guild (server) id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GuildId(pub u64);

/// Discord user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

/// Discord channel id (text channels and categories share the id space).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Discord message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

/// A stable reference to a Discord message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// The member a dialogue or permission edit is about.
///
/// `display_name` is only used for channel naming and log lines; identity is
/// always the id pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRef {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub display_name: String,
}

impl MemberRef {
    /// Chat-format mention for this member.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id.0)
    }
}

/// Chat-format mention for a text channel.
pub fn channel_mention(channel: ChannelId) -> String {
    format!("<#{}>", channel.0)
}
