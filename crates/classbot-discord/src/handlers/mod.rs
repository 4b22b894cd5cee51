//! Gateway event handlers.
//!
//! Each handler validates the event against the configured guild, builds the
//! port adapter, and calls into `classbot-core`. Failures are logged and
//! audited here; the dialogue itself already schedules its own cleanup.

use std::sync::Arc;

use serenity::all::{Context, Member, Reaction};

use classbot_core::{
    audit::AuditEvent,
    domain::{GuildId, MemberRef, MessageId, MessageRef, UserId},
    enrollment::{Enrollment, EnrollmentOutcome, EnrollmentTrigger},
    messaging::port::ChannelMutator,
};

use crate::router::AppState;
use crate::DiscordGateway;

pub mod commands;

pub async fn handle_member_join(ctx: Context, member: Member, state: Arc<AppState>) {
    if member.guild_id.get() != state.cfg.guild_id.0 || member.user.bot {
        return;
    }

    let member_ref = MemberRef {
        guild_id: GuildId(member.guild_id.get()),
        user_id: UserId(member.user.id.get()),
        display_name: member.display_name().to_string(),
    };
    run_enrollment(&ctx, &state, member_ref, EnrollmentTrigger::NewMember).await;
}

pub async fn handle_reaction(ctx: Context, reaction: Reaction, state: Arc<AppState>) {
    let Some(user_id) = reaction.user_id else {
        return;
    };

    // Only reactions on the cached announcement messages trigger anything.
    let Some(cache) = *state.announcements.read().await else {
        return;
    };
    let message_id = MessageId(reaction.message_id.get());
    let trigger = if message_id == cache.add_classes.message_id {
        EnrollmentTrigger::Announcement
    } else if cache.get_started.map(|m| m.message_id) == Some(message_id) {
        EnrollmentTrigger::NewMember
    } else {
        return;
    };

    let guild = state.cfg.guild_id;
    let member = match DiscordGateway::ds_guild(guild)
        .member(&ctx.http, DiscordGateway::ds_user(UserId(user_id.get())))
        .await
    {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("failed to fetch reacting member {}: {e}", user_id.get());
            return;
        }
    };
    if member.user.bot {
        return;
    }

    let member_ref = MemberRef {
        guild_id: guild,
        user_id: UserId(member.user.id.get()),
        display_name: member.display_name().to_string(),
    };
    run_enrollment(&ctx, &state, member_ref.clone(), trigger).await;

    // Always clear the triggering reaction so the member can re-trigger later.
    let gateway = DiscordGateway::new(&ctx);
    let msg = MessageRef {
        channel_id: state.cfg.announce_channel_id,
        message_id,
    };
    let emoji = reaction.emoji.to_string();
    if let Err(e) = gateway.remove_reaction(msg, member_ref.user_id, &emoji).await {
        tracing::warn!("failed to remove enrollment reaction: {e}");
    }
}

async fn run_enrollment(
    ctx: &Context,
    state: &Arc<AppState>,
    member: MemberRef,
    trigger: EnrollmentTrigger,
) {
    let gateway = Arc::new(DiscordGateway::new(ctx));
    let enrollment = Enrollment::new(
        state.cfg.clone(),
        gateway.clone(),
        gateway,
        state.registry.clone(),
        state.audit.clone(),
    );

    match enrollment.run(member.clone(), trigger).await {
        Ok(EnrollmentOutcome::AlreadyActive) => {}
        Ok(EnrollmentOutcome::Finished(report)) => {
            tracing::info!(
                "enrollment finished for {}: {} classes declared{}",
                member.display_name,
                report.declared,
                if report.timed_out { " (timed out)" } else { "" }
            );
        }
        Err(e) => {
            tracing::error!("enrollment failed for {}: {e}", member.display_name);
            let event = AuditEvent::error(
                member.user_id.0,
                &member.display_name,
                &e.to_string(),
                Some("enrollment"),
            );
            if let Err(audit_err) = state.audit.write(event) {
                tracing::warn!("failed to write error audit event: {audit_err}");
            }
        }
    }
}
