//! Class-group lifecycle: one category per class, three fixed child channels.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::{ChannelId, GuildId, MemberRef, UserId},
    errors::Error,
    messaging::{
        port::ChannelMutator,
        types::{Access, AccessSubject, ChannelBlueprint, ChannelInfo, ChannelKind},
    },
    reaper,
    Result,
};

/// The fixed shape of a class group. A group's category always parents
/// exactly these channels, in this order.
pub const GROUP_MANIFEST: [GroupManifestEntry; 3] = [
    GroupManifestEntry {
        emoji: "💬",
        label: "discussion",
    },
    GroupManifestEntry {
        emoji: "❓",
        label: "questions",
    },
    GroupManifestEntry {
        emoji: "📚",
        label: "resources",
    },
];

#[derive(Clone, Copy, Debug)]
pub struct GroupManifestEntry {
    pub emoji: &'static str,
    pub label: &'static str,
}

impl GroupManifestEntry {
    pub fn channel_name(&self) -> String {
        format!("{}-{}", self.emoji, self.label)
    }

    fn welcome(&self, canonical: &str) -> String {
        match self.label {
            "discussion" => format!("Welcome to {canonical}! This is the place to talk about the course."),
            "questions" => format!("Stuck on something in {canonical}? Ask here."),
            _ => format!("Share notes, links and past exams for {canonical} here."),
        }
    }
}

/// Whether a channel name matches one of the manifest labels.
pub fn is_group_channel_name(name: &str) -> bool {
    GROUP_MANIFEST.iter().any(|entry| name.contains(entry.label))
}

/// A freshly created group.
#[derive(Clone, Debug)]
pub struct CreatedGroup {
    pub category: ChannelId,
    pub channels: Vec<ChannelId>,
}

/// Creates groups and edits their membership through the platform port.
///
/// Holds no state of its own; the platform owns the channels and the
/// permission lists.
pub struct GroupManager {
    guild: GuildId,
    channels: Arc<dyn ChannelMutator>,
}

impl GroupManager {
    pub fn new(guild: GuildId, channels: Arc<dyn ChannelMutator>) -> Self {
        Self { guild, channels }
    }

    /// Look up an existing group by its canonical class name.
    pub async fn find(&self, canonical: &str) -> Result<Option<ChannelId>> {
        let all = self.channels.guild_channels(self.guild).await?;
        Ok(all
            .into_iter()
            .find(|c| c.kind == ChannelKind::Category && c.name == canonical)
            .map(|c| c.id))
    }

    /// Create the category and its three child channels, post and pin one
    /// welcome message per child, and seed permissions: owner gets
    /// view/send/history, the default role is denied.
    pub async fn create(&self, owner: &MemberRef, canonical: &str) -> Result<CreatedGroup> {
        let category = self
            .channels
            .create_channel(
                self.guild,
                ChannelBlueprint::category(canonical)
                    .overwrite(AccessSubject::Member(owner.user_id), Access::Allow)
                    .overwrite(AccessSubject::Everyone, Access::Deny),
            )
            .await?;

        let mut children = Vec::with_capacity(GROUP_MANIFEST.len());
        for entry in GROUP_MANIFEST {
            let child = self
                .channels
                .create_channel(
                    self.guild,
                    ChannelBlueprint::text(entry.channel_name())
                        .parent(category)
                        .overwrite(AccessSubject::Member(owner.user_id), Access::Allow)
                        .overwrite(AccessSubject::Everyone, Access::Deny),
                )
                .await?;

            let welcome = self.channels.send_message(child, &entry.welcome(canonical)).await?;
            self.channels.pin_message(welcome).await?;
            children.push(child);
        }

        tracing::info!("created class group {canonical} ({} channels)", children.len());
        Ok(CreatedGroup {
            category,
            channels: children,
        })
    }

    /// The group's child channels. Errors when the count does not match the
    /// manifest, rather than silently acting on a subset.
    pub async fn children(&self, category: ChannelId) -> Result<Vec<ChannelInfo>> {
        let children = self.children_unchecked(category).await?;
        if children.len() != GROUP_MANIFEST.len() {
            return Err(Error::Platform(format!(
                "category {} has {} child channels, expected {}",
                category.0,
                children.len(),
                GROUP_MANIFEST.len()
            )));
        }
        Ok(children)
    }

    async fn children_unchecked(&self, category: ChannelId) -> Result<Vec<ChannelInfo>> {
        let all = self.channels.guild_channels(self.guild).await?;
        Ok(all
            .into_iter()
            .filter(|c| c.parent == Some(category))
            .collect())
    }

    /// Grant the member view/send/history on every child channel. Granting
    /// twice leaves the same effective permission state.
    pub async fn grant(&self, user: UserId, category: ChannelId) -> Result<Vec<ChannelInfo>> {
        self.set_access(user, category, Access::Allow).await
    }

    /// Symmetric denial of the same permissions on every child channel.
    pub async fn revoke(&self, user: UserId, category: ChannelId) -> Result<Vec<ChannelInfo>> {
        self.set_access(user, category, Access::Deny).await
    }

    async fn set_access(
        &self,
        user: UserId,
        category: ChannelId,
        access: Access,
    ) -> Result<Vec<ChannelInfo>> {
        let children = self.children(category).await?;
        for child in &children {
            self.channels.set_member_access(child.id, user, access).await?;
        }
        Ok(children)
    }

    /// Delete every child channel (warning posted, short delay) and then the
    /// category itself (same delay, no warning). Individual delete failures
    /// are logged and swallowed by the reaper.
    pub async fn delete_group(&self, category: ChannelId, delay: Duration) -> Result<()> {
        let children = self.children_unchecked(category).await?;
        for child in children {
            reaper::reap(self.channels.as_ref(), child.id, delay, true).await;
        }
        reaper::reap(self.channels.as_ref(), category, delay, false).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_member, FakeGuild, GUILD};

    fn manager(guild: &Arc<FakeGuild>) -> GroupManager {
        GroupManager::new(GUILD, guild.clone())
    }

    #[tokio::test]
    async fn create_builds_category_with_three_pinned_children() {
        let guild = Arc::new(FakeGuild::new());
        let owner = test_member(42);

        let group = manager(&guild).create(&owner, "cs-1026").await.unwrap();

        assert_eq!(group.channels.len(), 3);
        let children = guild.children_of(group.category);
        let names: Vec<_> = children.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["💬-discussion", "❓-questions", "📚-resources"]);

        // One welcome message pinned per child.
        for child in &children {
            assert_eq!(guild.messages_in(child.id).len(), 1);
            assert_eq!(guild.pins_in(child.id), 1);
        }

        // Owner allowed, default role denied, on the category and children.
        assert_eq!(guild.member_access(group.category, owner.user_id), Some(Access::Allow));
        assert!(guild.everyone_denied(group.category));
        for child in &children {
            assert_eq!(guild.member_access(child.id, owner.user_id), Some(Access::Allow));
            assert!(guild.everyone_denied(child.id));
        }
    }

    #[tokio::test]
    async fn find_matches_canonical_category_name() {
        let guild = Arc::new(FakeGuild::new());
        let (category, _) = guild.seed_group("cs-1026");
        guild.add_text_channel("cs-1026", None); // same name, not a category

        let mgr = manager(&guild);
        assert_eq!(mgr.find("cs-1026").await.unwrap(), Some(category));
        assert_eq!(mgr.find("math-1600").await.unwrap(), None);
    }

    #[tokio::test]
    async fn revoke_then_grant_leaves_granted_permissions() {
        let guild = Arc::new(FakeGuild::new());
        let (category, children) = guild.seed_group("cs-1026");
        let user = UserId(7);

        let mgr = manager(&guild);
        mgr.revoke(user, category).await.unwrap();
        mgr.grant(user, category).await.unwrap();
        mgr.grant(user, category).await.unwrap(); // idempotent

        for child in children {
            assert_eq!(guild.member_access(child, user), Some(Access::Allow));
        }
    }

    #[tokio::test]
    async fn children_fails_loudly_on_unexpected_shape() {
        let guild = Arc::new(FakeGuild::new());
        let (category, _) = guild.seed_group("cs-1026");
        guild.add_text_channel("🎤-lounge", Some(category));

        let err = manager(&guild).children(category).await.unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
    }

    #[tokio::test]
    async fn delete_group_removes_children_then_category() {
        let guild = Arc::new(FakeGuild::new());
        let (category, children) = guild.seed_group("cs-1026");

        manager(&guild)
            .delete_group(category, Duration::from_secs(0))
            .await
            .unwrap();

        let deleted = guild.deleted();
        for child in &children {
            assert!(deleted.contains(child));
            // Warning posted to each child before deletion.
            assert!(guild
                .messages_in(*child)
                .iter()
                .any(|m| m.starts_with("Channel deleting in")));
        }
        assert!(deleted.contains(&category));
        // No warning in the category itself.
        assert!(guild.messages_in(category).is_empty());
        assert_eq!(*deleted.last().unwrap(), category);
    }
}
