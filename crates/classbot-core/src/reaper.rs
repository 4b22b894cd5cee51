//! Delayed deletion of bot-owned channels.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::ChannelId,
    messaging::port::ChannelMutator,
};

/// Post an optional countdown, wait, then delete the channel.
///
/// Delete failures (e.g. the channel was already removed by hand) are logged
/// and swallowed; there is no retry and nothing is surfaced to the user.
pub async fn reap(
    channels: &dyn ChannelMutator,
    channel: ChannelId,
    delay: Duration,
    announce: bool,
) {
    if announce {
        let notice = format!("Channel deleting in {} seconds...", delay.as_secs());
        if let Err(e) = channels.send_message(channel, &notice).await {
            tracing::warn!("failed to announce deletion of channel {}: {e}", channel.0);
        }
    }

    tokio::time::sleep(delay).await;

    if let Err(e) = channels.delete_channel(channel).await {
        tracing::warn!("failed to delete channel {}: {e}", channel.0);
    }
}

/// Fire-and-forget [`reap`]; the dialogue does not wait for the countdown.
pub fn schedule_reap(
    channels: Arc<dyn ChannelMutator>,
    channel: ChannelId,
    delay: Duration,
    announce: bool,
) {
    tokio::spawn(async move {
        reap(channels.as_ref(), channel, delay, announce).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGuild;

    #[tokio::test]
    async fn reap_announces_then_deletes() {
        let guild = FakeGuild::new();
        let channel = guild.add_text_channel("kaden-classes", None);

        reap(&guild, channel, Duration::from_secs(0), true).await;

        let messages = guild.messages_in(channel);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Channel deleting in"));
        assert!(guild.deleted().contains(&channel));
    }

    #[tokio::test]
    async fn reap_without_announce_only_deletes() {
        let guild = FakeGuild::new();
        let channel = guild.add_text_channel("cs-1026", None);

        reap(&guild, channel, Duration::from_secs(0), false).await;

        assert!(guild.messages_in(channel).is_empty());
        assert!(guild.deleted().contains(&channel));
    }

    #[tokio::test]
    async fn reap_swallows_delete_failures() {
        let guild = FakeGuild::new();
        // Never created, so the delete call fails inside the fake.
        let ghost = ChannelId(999_999);

        reap(&guild, ghost, Duration::from_secs(0), false).await;
        assert!(guild.deleted().is_empty());
    }
}
