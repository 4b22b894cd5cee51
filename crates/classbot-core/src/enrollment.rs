//! The per-member enrollment dialogue.
//!
//! One conversation per triggering member, run in a private scratch channel:
//! ask how many classes, then for each one resolve or create the class group
//! and grant access. Every wait is bounded; an expired wait aborts the
//! dialogue and the scratch channel is always handed to the reaper.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use crate::{
    audit::{AuditEvent, AuditLogger},
    classname::{canonical_class_name, parse_class_count},
    config::Config,
    domain::{channel_mention, ChannelId, MemberRef, UserId},
    groups::GroupManager,
    messaging::{
        port::{ChannelMutator, MessageWaiter},
        types::{Access, AccessSubject, ChannelBlueprint},
    },
    reaper,
    Result,
};

/// What started the dialogue. Decides the welcome line and is recorded in
/// the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollmentTrigger {
    /// The member just joined the community.
    NewMember,
    /// An existing member reacted to the enrollment announcement.
    Announcement,
}

impl EnrollmentTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::NewMember => "new_member",
            Self::Announcement => "announcement",
        }
    }
}

/// Transient per-conversation state. Created when a trigger fires, mutated
/// only by the dialogue that owns it, dropped when the dialogue ends.
#[derive(Clone, Debug)]
pub struct EnrollmentSession {
    pub member: MemberRef,
    pub declared: u8,
    pub current: u8,
    pub timed_out: bool,
    pub is_new_member: bool,
}

#[derive(Clone, Debug)]
pub struct EnrollmentReport {
    pub declared: u8,
    pub timed_out: bool,
    pub scratch: ChannelId,
}

#[derive(Clone, Debug)]
pub enum EnrollmentOutcome {
    /// A dialogue was already running for this member; nothing was done.
    AlreadyActive,
    Finished(EnrollmentReport),
}

/// Process-wide set of members with an active dialogue.
///
/// A second trigger while a member's dialogue is in flight is rejected, so
/// there is never more than one scratch channel per member.
#[derive(Default)]
pub struct SessionRegistry {
    active: Mutex<HashSet<u64>>,
}

impl SessionRegistry {
    pub fn try_claim(self: &Arc<Self>, user: UserId) -> Option<SessionClaim> {
        let mut active = lock(&self.active);
        if !active.insert(user.0) {
            return None;
        }
        Some(SessionClaim {
            registry: Arc::clone(self),
            user,
        })
    }

    pub fn is_active(&self, user: UserId) -> bool {
        lock(&self.active).contains(&user.0)
    }
}

/// Releases the member's slot when the dialogue ends, on every exit path.
pub struct SessionClaim {
    registry: Arc<SessionRegistry>,
    user: UserId,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        lock(&self.registry.active).remove(&self.user.0);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One dialogue run's dependencies: the two platform capabilities plus the
/// shared config, registry and audit log.
pub struct Enrollment {
    cfg: Arc<Config>,
    channels: Arc<dyn ChannelMutator>,
    waiter: Arc<dyn MessageWaiter>,
    registry: Arc<SessionRegistry>,
    audit: Arc<AuditLogger>,
}

impl Enrollment {
    pub fn new(
        cfg: Arc<Config>,
        channels: Arc<dyn ChannelMutator>,
        waiter: Arc<dyn MessageWaiter>,
        registry: Arc<SessionRegistry>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            cfg,
            channels,
            waiter,
            registry,
            audit,
        }
    }

    /// Run the whole dialogue for one member.
    ///
    /// The scratch channel is scheduled for deletion and the audit event is
    /// written whether the dialogue completes, times out, or errors.
    pub async fn run(
        &self,
        member: MemberRef,
        trigger: EnrollmentTrigger,
    ) -> Result<EnrollmentOutcome> {
        let Some(_claim) = self.registry.try_claim(member.user_id) else {
            tracing::info!(
                "enrollment already active for {} ({})",
                member.display_name,
                member.user_id.0
            );
            return Ok(EnrollmentOutcome::AlreadyActive);
        };

        let scratch = self.create_scratch_channel(&member).await?;

        let mut session = EnrollmentSession {
            member,
            declared: 0,
            current: 0,
            timed_out: false,
            is_new_member: trigger == EnrollmentTrigger::NewMember,
        };

        let result = self.dialogue(&mut session, scratch).await;

        reaper::schedule_reap(self.channels.clone(), scratch, self.cfg.reap_delay, true);

        let event = AuditEvent::enrollment(
            session.member.user_id.0,
            &session.member.display_name,
            trigger.as_str(),
            session.declared,
            session.timed_out,
        );
        if let Err(e) = self.audit.write(event) {
            tracing::warn!("failed to write enrollment audit event: {e}");
        }

        result?;
        Ok(EnrollmentOutcome::Finished(EnrollmentReport {
            declared: session.declared,
            timed_out: session.timed_out,
            scratch,
        }))
    }

    async fn create_scratch_channel(&self, member: &MemberRef) -> Result<ChannelId> {
        let blueprint = ChannelBlueprint::text(format!("{}-classes", member.display_name))
            .overwrite(AccessSubject::Member(member.user_id), Access::Allow)
            .overwrite(AccessSubject::Everyone, Access::Deny);
        self.channels.create_channel(member.guild_id, blueprint).await
    }

    async fn dialogue(&self, session: &mut EnrollmentSession, scratch: ChannelId) -> Result<()> {
        let welcome = if session.is_new_member {
            format!("Welcome to the server, {}!", session.member.mention())
        } else {
            format!("Welcome back, {}!", session.member.mention())
        };
        self.channels.send_message(scratch, &welcome).await?;

        session.declared = self.ask_class_count(session, scratch).await?;

        let groups = GroupManager::new(session.member.guild_id, self.channels.clone());
        while session.current < session.declared && !session.timed_out {
            session.current += 1;
            self.ask_class(session, &groups, scratch).await?;
        }

        if session.declared > 0 && !session.timed_out {
            self.channels
                .send_message(scratch, "You have now been added to all of your classes!")
                .await?;
        }
        Ok(())
    }

    /// Prompt for the class count and loop until a valid answer or a timeout.
    /// A timeout reads as zero classes and ends the dialogue as a no-op.
    async fn ask_class_count(
        &self,
        session: &mut EnrollmentSession,
        scratch: ChannelId,
    ) -> Result<u8> {
        self.channels
            .send_message(scratch, "How many classes are you in? (Enter a value from 0-9)")
            .await?;

        loop {
            let reply = self
                .waiter
                .next_message(scratch, session.member.user_id, self.cfg.prompt_timeout)
                .await?;

            let Some(msg) = reply else {
                self.channels
                    .send_message(scratch, "No response received.")
                    .await?;
                session.timed_out = true;
                return Ok(0);
            };

            if let Some(count) = parse_class_count(&msg.content) {
                return Ok(count);
            }

            self.channels
                .send_message(scratch, "Invalid input. Please enter a value from 0-9.")
                .await?;
        }
    }

    /// Ask for one class name, then join or create its group. A timeout on
    /// either prompt aborts the rest of the dialogue.
    async fn ask_class(
        &self,
        session: &mut EnrollmentSession,
        groups: &GroupManager,
        scratch: ChannelId,
    ) -> Result<()> {
        let prompt = format!(
            "What is the name of class number {}? Make sure it is in the format \"cs1026\"",
            session.current
        );
        self.channels.send_message(scratch, &prompt).await?;

        let Some(msg) = self
            .waiter
            .next_message(scratch, session.member.user_id, self.cfg.prompt_timeout)
            .await?
        else {
            session.timed_out = true;
            return Ok(());
        };

        let canonical = canonical_class_name(&msg.content);

        if let Some(category) = groups.find(&canonical).await? {
            let children = groups.grant(session.member.user_id, category).await?;
            self.write_access_event(session, &canonical, true);

            let mention = children
                .first()
                .map(|c| channel_mention(c.id))
                .unwrap_or_else(|| canonical.clone());
            self.channels
                .send_message(scratch, &format!("You have been added to {mention}!"))
                .await?;
            return Ok(());
        }

        self.channels
            .send_message(
                scratch,
                &format!(
                    "There is no channel yet for {canonical}. Do you want me to create it for you? (y/n)"
                ),
            )
            .await?;

        let Some(answer) = self
            .waiter
            .next_message(scratch, session.member.user_id, self.cfg.prompt_timeout)
            .await?
        else {
            session.timed_out = true;
            return Ok(());
        };

        if !answer.content.trim().eq_ignore_ascii_case("y") {
            // Anything but an affirmative: move on without creating.
            return Ok(());
        }

        let group = groups.create(&session.member, &canonical).await?;
        let event = AuditEvent::group_created(
            session.member.user_id.0,
            &session.member.display_name,
            &canonical,
        );
        if let Err(e) = self.audit.write(event) {
            tracing::warn!("failed to write group_created audit event: {e}");
        }

        let mention = group
            .channels
            .first()
            .map(|id| channel_mention(*id))
            .unwrap_or_else(|| canonical.clone());
        self.channels
            .send_message(scratch, &format!("You have been added to {mention}!"))
            .await?;
        Ok(())
    }

    fn write_access_event(&self, session: &EnrollmentSession, canonical: &str, granted: bool) {
        let event = AuditEvent::access(session.member.user_id.0, canonical, granted);
        if let Err(e) = self.audit.write(event) {
            tracing::warn!("failed to write access audit event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{test_config, test_member, FakeGuild};

    struct Harness {
        guild: Arc<FakeGuild>,
        enrollment: Enrollment,
        registry: Arc<SessionRegistry>,
    }

    fn harness() -> Harness {
        let guild = Arc::new(FakeGuild::new());
        let cfg = Arc::new(test_config());
        let registry = Arc::new(SessionRegistry::default());
        let audit = Arc::new(AuditLogger::new(cfg.audit_log_path.clone(), true));
        let enrollment = Enrollment::new(
            cfg,
            guild.clone(),
            guild.clone(),
            registry.clone(),
            audit,
        );
        Harness {
            guild,
            enrollment,
            registry,
        }
    }

    fn scratch_of(outcome: &EnrollmentOutcome) -> ChannelId {
        match outcome {
            EnrollmentOutcome::Finished(report) => report.scratch,
            EnrollmentOutcome::AlreadyActive => panic!("dialogue did not run"),
        }
    }

    async fn settle() {
        // Let the detached reap task (zero delay in tests) run.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn zero_classes_is_a_valid_no_op_enrollment() {
        let h = harness();
        h.guild.script_replies([Some("0")]);

        let outcome = h
            .enrollment
            .run(test_member(42), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        let scratch = scratch_of(&outcome);

        let messages = h.guild.messages_in(scratch);
        assert!(messages[0].starts_with("Welcome to the server"));
        assert!(messages[1].starts_with("How many classes"));
        assert!(!messages.iter().any(|m| m.contains("name of class")));
        assert!(!messages.iter().any(|m| m.contains("added to all")));

        settle().await;
        assert!(h.guild.deleted().contains(&scratch));
    }

    #[tokio::test]
    async fn joins_existing_group_and_creates_confirmed_one() {
        let h = harness();
        let (_existing, children) = h.guild.seed_group("cs-1026");
        h.guild
            .script_replies([Some("2"), Some("cs1026"), Some("math1600"), Some("y")]);

        let member = test_member(42);
        let outcome = h
            .enrollment
            .run(member.clone(), EnrollmentTrigger::Announcement)
            .await
            .unwrap();
        let scratch = scratch_of(&outcome);

        // Granted on every child of the existing group.
        for child in children {
            assert_eq!(
                h.guild.member_access(child, member.user_id),
                Some(Access::Allow)
            );
        }
        // Exactly one new group, with its three children and pinned welcomes.
        let categories = h.guild.categories();
        assert_eq!(categories, vec!["cs-1026", "math-1600"]);
        let new_children = h.guild.children_of(h.guild.category_id("math-1600"));
        assert_eq!(new_children.len(), 3);

        let messages = h.guild.messages_in(scratch);
        assert!(messages[0].starts_with("Welcome back"));
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.starts_with("You have been added to <#"))
                .count(),
            2
        );
        assert!(messages.iter().any(|m| m.contains("added to all")));
    }

    #[tokio::test]
    async fn class_name_timeout_aborts_without_side_effects() {
        let h = harness();
        h.guild.script_replies([Some("1"), None]);

        let member = test_member(42);
        let outcome = h
            .enrollment
            .run(member.clone(), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        let EnrollmentOutcome::Finished(report) = &outcome else {
            panic!("dialogue did not run");
        };
        assert!(report.timed_out);

        // No group created or joined; only the scratch channel exists.
        assert!(h.guild.categories().is_empty());
        let messages = h.guild.messages_in(report.scratch);
        assert!(!messages.iter().any(|m| m.contains("added to all")));
        assert!(!messages.iter().any(|m| m.starts_with("You have been added")));

        settle().await;
        assert!(h.guild.deleted().contains(&report.scratch));
    }

    #[tokio::test]
    async fn count_timeout_reads_as_zero() {
        let h = harness();
        h.guild.script_replies([None]);

        let outcome = h
            .enrollment
            .run(test_member(42), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        let EnrollmentOutcome::Finished(report) = &outcome else {
            panic!("dialogue did not run");
        };

        assert_eq!(report.declared, 0);
        assert!(report.timed_out);
        let messages = h.guild.messages_in(report.scratch);
        assert!(messages.iter().any(|m| m == "No response received."));
        assert!(!messages.iter().any(|m| m.contains("added to all")));
    }

    #[tokio::test]
    async fn invalid_count_is_reprompted() {
        let h = harness();
        h.guild.script_replies([Some("abc"), Some("12"), Some("0")]);

        let outcome = h
            .enrollment
            .run(test_member(42), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        let scratch = scratch_of(&outcome);

        let messages = h.guild.messages_in(scratch);
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.starts_with("Invalid input"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn non_affirmative_confirmation_skips_creation() {
        let h = harness();
        h.guild.script_replies([Some("1"), Some("bio2244"), Some("nah")]);

        let outcome = h
            .enrollment
            .run(test_member(42), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        let scratch = scratch_of(&outcome);

        assert!(h.guild.categories().is_empty());
        // The dialogue still finishes normally.
        let messages = h.guild.messages_in(scratch);
        assert!(messages.iter().any(|m| m.contains("added to all")));
    }

    #[tokio::test]
    async fn second_trigger_while_active_is_rejected() {
        let h = harness();
        let member = test_member(42);
        let _claim = h.registry.try_claim(member.user_id).unwrap();

        let outcome = h
            .enrollment
            .run(member, EnrollmentTrigger::Announcement)
            .await
            .unwrap();

        assert!(matches!(outcome, EnrollmentOutcome::AlreadyActive));
        assert!(h.guild.channel_names().is_empty());
    }

    #[tokio::test]
    async fn claim_is_released_when_the_dialogue_ends() {
        let h = harness();
        h.guild.script_replies([Some("0"), Some("0")]);
        let member = test_member(42);

        h.enrollment
            .run(member.clone(), EnrollmentTrigger::NewMember)
            .await
            .unwrap();
        assert!(!h.registry.is_active(member.user_id));

        // A later trigger runs again.
        let outcome = h
            .enrollment
            .run(member, EnrollmentTrigger::Announcement)
            .await
            .unwrap();
        assert!(matches!(outcome, EnrollmentOutcome::Finished(_)));
    }
}
