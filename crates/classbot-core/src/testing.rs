//! In-memory fakes for the capability ports, shared by the module tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{ChannelId, GuildId, MemberRef, MessageRef, MessageId, UserId},
    errors::Error,
    messaging::{
        port::{ChannelMutator, MessageWaiter},
        types::{Access, AccessSubject, ChannelBlueprint, ChannelInfo, ChannelKind, IncomingMessage},
    },
    Result,
};

pub(crate) const GUILD: GuildId = GuildId(1);

pub(crate) fn test_member(user: u64) -> MemberRef {
    MemberRef {
        guild_id: GUILD,
        user_id: UserId(user),
        display_name: "kaden".to_string(),
    }
}

pub(crate) fn test_config() -> Config {
    Config {
        discord_bot_token: "test-token".to_string(),
        guild_id: GUILD,
        announce_channel_id: ChannelId(10),
        add_classes_message_id: MessageId(11),
        get_started_message_id: None,
        openai_api_key: None,
        help_available: false,
        help_preamble: "Answer the question.".to_string(),
        completion_model: "gpt-3.5-turbo-instruct".to_string(),
        completion_max_tokens: 64,
        completion_temperature: 0.7,
        prompt_timeout: Duration::from_millis(10),
        reap_delay: Duration::from_secs(0),
        delete_delay: Duration::from_secs(0),
        message_chunk_limit: 2000,
        audit_log_path: std::env::temp_dir().join(format!(
            "classbot-test-audit-{}-{}.log",
            std::process::id(),
            NEXT_LOG.fetch_add(1, Ordering::Relaxed)
        )),
        audit_log_json: true,
    }
}

static NEXT_LOG: AtomicU64 = AtomicU64::new(0);

/// One guild's worth of channels, messages and permission entries, plus a
/// scripted queue of member replies for dialogue tests.
pub(crate) struct FakeGuild {
    next_id: AtomicU64,
    channels: Mutex<Vec<ChannelInfo>>,
    member_access: Mutex<HashMap<(u64, u64), Access>>,
    everyone_denied: Mutex<Vec<u64>>,
    messages: Mutex<Vec<(ChannelId, String)>>,
    pins: Mutex<Vec<MessageRef>>,
    deleted: Mutex<Vec<ChannelId>>,
    replies: Mutex<VecDeque<Option<String>>>,
}

impl FakeGuild {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(100),
            channels: Mutex::new(Vec::new()),
            member_access: Mutex::new(HashMap::new()),
            everyone_denied: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            pins: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock<'a, T>(m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        match m.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Script the member's replies in order; `None` entries time out.
    pub(crate) fn script_replies<I>(&self, replies: I)
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        let mut queue = Self::lock(&self.replies);
        queue.extend(replies.into_iter().map(|r| r.map(|s| s.to_string())));
    }

    pub(crate) fn add_text_channel(&self, name: &str, parent: Option<ChannelId>) -> ChannelId {
        let id = ChannelId(self.alloc_id());
        Self::lock(&self.channels).push(ChannelInfo {
            id,
            name: name.to_string(),
            kind: ChannelKind::Text,
            parent,
        });
        id
    }

    pub(crate) fn add_category(&self, name: &str) -> ChannelId {
        let id = ChannelId(self.alloc_id());
        Self::lock(&self.channels).push(ChannelInfo {
            id,
            name: name.to_string(),
            kind: ChannelKind::Category,
            parent: None,
        });
        id
    }

    /// An existing class group: category plus the three manifest children.
    pub(crate) fn seed_group(&self, canonical: &str) -> (ChannelId, Vec<ChannelId>) {
        let category = self.add_category(canonical);
        let children = crate::groups::GROUP_MANIFEST
            .iter()
            .map(|entry| self.add_text_channel(&entry.channel_name(), Some(category)))
            .collect();
        (category, children)
    }

    pub(crate) fn channel_names(&self) -> Vec<String> {
        Self::lock(&self.channels).iter().map(|c| c.name.clone()).collect()
    }

    /// Id of the category with this name; panics if absent (test-only).
    pub(crate) fn category_id(&self, name: &str) -> ChannelId {
        Self::lock(&self.channels)
            .iter()
            .find(|c| c.kind == ChannelKind::Category && c.name == name)
            .map(|c| c.id)
            .unwrap_or_else(|| panic!("no category named {name}"))
    }

    pub(crate) fn categories(&self) -> Vec<String> {
        Self::lock(&self.channels)
            .iter()
            .filter(|c| c.kind == ChannelKind::Category)
            .map(|c| c.name.clone())
            .collect()
    }

    pub(crate) fn children_of(&self, category: ChannelId) -> Vec<ChannelInfo> {
        Self::lock(&self.channels)
            .iter()
            .filter(|c| c.parent == Some(category))
            .cloned()
            .collect()
    }

    pub(crate) fn messages_in(&self, channel: ChannelId) -> Vec<String> {
        Self::lock(&self.messages)
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub(crate) fn pins_in(&self, channel: ChannelId) -> usize {
        Self::lock(&self.pins)
            .iter()
            .filter(|m| m.channel_id == channel)
            .count()
    }

    pub(crate) fn deleted(&self) -> Vec<ChannelId> {
        Self::lock(&self.deleted).clone()
    }

    pub(crate) fn member_access(&self, channel: ChannelId, user: UserId) -> Option<Access> {
        Self::lock(&self.member_access)
            .get(&(channel.0, user.0))
            .copied()
    }

    pub(crate) fn everyone_denied(&self, channel: ChannelId) -> bool {
        Self::lock(&self.everyone_denied).contains(&channel.0)
    }
}

#[async_trait]
impl ChannelMutator for FakeGuild {
    async fn create_channel(
        &self,
        _guild: GuildId,
        blueprint: ChannelBlueprint,
    ) -> Result<ChannelId> {
        let id = ChannelId(self.alloc_id());
        Self::lock(&self.channels).push(ChannelInfo {
            id,
            name: blueprint.name.clone(),
            kind: blueprint.kind,
            parent: blueprint.parent,
        });

        for rule in &blueprint.overwrites {
            match rule.subject {
                AccessSubject::Member(user) => {
                    Self::lock(&self.member_access).insert((id.0, user.0), rule.access);
                }
                AccessSubject::Everyone => {
                    if rule.access == Access::Deny {
                        Self::lock(&self.everyone_denied).push(id.0);
                    }
                }
            }
        }
        Ok(id)
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        let mut channels = Self::lock(&self.channels);
        let Some(pos) = channels.iter().position(|c| c.id == channel) else {
            return Err(Error::Platform(format!("no such channel: {}", channel.0)));
        };
        channels.remove(pos);
        drop(channels);
        Self::lock(&self.deleted).push(channel);
        Ok(())
    }

    async fn set_member_access(
        &self,
        channel: ChannelId,
        user: UserId,
        access: Access,
    ) -> Result<()> {
        Self::lock(&self.member_access).insert((channel.0, user.0), access);
        Ok(())
    }

    async fn guild_channels(&self, _guild: GuildId) -> Result<Vec<ChannelInfo>> {
        Ok(Self::lock(&self.channels).clone())
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageRef> {
        Self::lock(&self.messages).push((channel, text.to_string()));
        Ok(MessageRef {
            channel_id: channel,
            message_id: MessageId(self.alloc_id()),
        })
    }

    async fn pin_message(&self, msg: MessageRef) -> Result<()> {
        Self::lock(&self.pins).push(msg);
        Ok(())
    }

    async fn remove_reaction(&self, _msg: MessageRef, _user: UserId, _emoji: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl MessageWaiter for FakeGuild {
    async fn next_message(
        &self,
        _channel: ChannelId,
        author: UserId,
        _timeout: Duration,
    ) -> Result<Option<IncomingMessage>> {
        let next = Self::lock(&self.replies).pop_front();
        Ok(next.flatten().map(|content| IncomingMessage {
            author,
            content,
        }))
    }
}
