//! Question-answer relay: one completion call, answer chunked into chat.

use async_trait::async_trait;

use crate::{config::Config, domain::ChannelId, messaging::port::ChannelMutator, Result};

/// Port for a text-completion backend.
///
/// One operation, awaited before the dialogue proceeds. The OpenAI adapter
/// is the first implementation.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// Wrap the member's question in the fixed instructional preamble and run a
/// single completion with the configured model limits.
pub async fn ask(client: &dyn CompletionClient, cfg: &Config, question: &str) -> Result<String> {
    let prompt = format!("{}\n\nQuestion: {}\nAnswer:", cfg.help_preamble, question.trim());
    client
        .complete(&prompt, cfg.completion_max_tokens, cfg.completion_temperature)
        .await
}

/// Split into contiguous chunks of at most `limit` characters, preserving
/// order. Character-counted, so multi-byte text never splits a code point.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send `text` to the channel as ordered fixed-size messages.
pub async fn relay(
    channels: &dyn ChannelMutator,
    channel: ChannelId,
    text: &str,
    limit: usize,
) -> Result<()> {
    for chunk in split_chunks(text, limit) {
        channels.send_message(channel, &chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGuild;

    #[test]
    fn splits_into_ordered_fixed_size_chunks() {
        let text = "a".repeat(4500);
        let chunks = split_chunks(&text, 2000);
        let lens: Vec<_> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lens, vec![2000, 2000, 500]);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split_chunks("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(split_chunks("", 2000).is_empty());
    }

    #[test]
    fn chunking_is_character_counted() {
        let text = "é".repeat(5);
        let chunks = split_chunks(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[tokio::test]
    async fn relay_sends_chunks_in_order() {
        let guild = FakeGuild::new();
        let channel = guild.add_text_channel("general", None);

        let mut text = "x".repeat(2000);
        text.push_str(&"y".repeat(2000));
        text.push_str(&"z".repeat(500));
        relay(&guild, channel, &text, 2000).await.unwrap();

        let messages = guild.messages_in(channel);
        assert_eq!(messages.len(), 3);
        assert!(messages[0].chars().all(|c| c == 'x'));
        assert!(messages[1].chars().all(|c| c == 'y'));
        assert_eq!(messages[2].len(), 500);
    }
}
