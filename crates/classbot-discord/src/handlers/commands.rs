//! Slash commands: /leave, /help, /deleteclass.
//!
//! Dispatch is the error boundary for command execution: a failed command is
//! logged, audited, and answered with a generic failure message.

use std::sync::Arc;

use serenity::all::{
    Channel, CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
    CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    Permissions,
};

use classbot_core::{
    audit::AuditEvent,
    classname::is_canonical_class_name,
    config::Config,
    domain::{ChannelId, UserId},
    groups::{is_group_channel_name, GroupManager},
    messaging::port::ChannelMutator,
    relay,
    Result,
};

use crate::router::AppState;
use crate::DiscordGateway;

/// Register the guild's slash commands at startup.
pub async fn register(ctx: &Context, cfg: &Config) -> Result<()> {
    let commands = vec![
        CreateCommand::new("leave").description("Leaves class"),
        CreateCommand::new("help")
            .description("Responds to questions about the server.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "question",
                    "The question you have about the server.",
                )
                .required(true),
            ),
        CreateCommand::new("deleteclass")
            .description("Deletes class")
            .default_member_permissions(Permissions::ADMINISTRATOR),
    ];

    DiscordGateway::ds_guild(cfg.guild_id)
        .set_commands(&ctx.http, commands)
        .await
        .map_err(DiscordGateway::map_err)?;

    tracing::info!("registered slash commands for guild {}", cfg.guild_id.0);
    Ok(())
}

pub async fn dispatch(ctx: Context, cmd: CommandInteraction, state: Arc<AppState>) {
    let name = cmd.data.name.clone();
    let result = match name.as_str() {
        "leave" => leave(&ctx, &cmd, &state).await,
        "help" => help(&ctx, &cmd, &state).await,
        "deleteclass" => delete_class(&ctx, &cmd, &state).await,
        other => {
            tracing::warn!("unknown command /{other}");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!("command /{name} failed: {e}");
        let event = AuditEvent::error(
            cmd.user.id.get(),
            &cmd.user.name,
            &e.to_string(),
            Some(&format!("/{name}")),
        );
        if let Err(audit_err) = state.audit.write(event) {
            tracing::warn!("failed to write error audit event: {audit_err}");
        }
        report_failure(&ctx, &cmd).await;
    }
}

/// The class group a command was invoked inside, if any: the channel must be
/// one of the manifest channels and its category a canonical class name.
struct GroupContext {
    category: ChannelId,
    canonical: String,
}

async fn group_context(ctx: &Context, cmd: &CommandInteraction) -> Result<Option<GroupContext>> {
    let channel = cmd
        .channel_id
        .to_channel(&ctx.http)
        .await
        .map_err(DiscordGateway::map_err)?;
    let Channel::Guild(channel) = channel else {
        return Ok(None);
    };
    if !is_group_channel_name(&channel.name) {
        return Ok(None);
    }

    let Some(parent_id) = channel.parent_id else {
        return Ok(None);
    };
    let parent = parent_id
        .to_channel(&ctx.http)
        .await
        .map_err(DiscordGateway::map_err)?;
    let Channel::Guild(parent) = parent else {
        return Ok(None);
    };
    if !is_canonical_class_name(&parent.name) {
        return Ok(None);
    }

    Ok(Some(GroupContext {
        category: ChannelId(parent_id.get()),
        canonical: parent.name.clone(),
    }))
}

async fn leave(ctx: &Context, cmd: &CommandInteraction, state: &Arc<AppState>) -> Result<()> {
    let Some(group) = group_context(ctx, cmd).await? else {
        return respond_ephemeral(ctx, cmd, "You can only leave a class from one of its channels.")
            .await;
    };

    let gateway = Arc::new(DiscordGateway::new(ctx));
    let groups = GroupManager::new(state.cfg.guild_id, gateway);
    let user = UserId(cmd.user.id.get());
    groups.revoke(user, group.category).await?;

    let event = AuditEvent::access(user.0, &group.canonical, false);
    if let Err(e) = state.audit.write(event) {
        tracing::warn!("failed to write access audit event: {e}");
    }

    respond_ephemeral(ctx, cmd, &format!("You have left {}.", group.canonical)).await
}

async fn help(ctx: &Context, cmd: &CommandInteraction, state: &Arc<AppState>) -> Result<()> {
    let question = cmd
        .data
        .options
        .first()
        .and_then(|o| o.value.as_str())
        .unwrap_or("")
        .to_string();

    // Enrollment scratch channels are off limits; their owner is mid-dialogue.
    let channel = cmd
        .channel_id
        .to_channel(&ctx.http)
        .await
        .map_err(DiscordGateway::map_err)?;
    if let Channel::Guild(channel) = &channel {
        if is_scratch_channel_name(&channel.name) {
            return respond_ephemeral(ctx, cmd, "You can't use this command in an enrollment channel.")
                .await;
        }
    }

    let Some(client) = &state.completion else {
        return respond_ephemeral(ctx, cmd, "Question answering is not configured on this server.")
            .await;
    };

    // The completion call can take a while; acknowledge first.
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
    )
    .await
    .map_err(DiscordGateway::map_err)?;

    let answer = relay::ask(client.as_ref(), &state.cfg, &question).await?;
    let mut chunks = relay::split_chunks(&answer, state.cfg.message_chunk_limit).into_iter();

    let first = chunks
        .next()
        .unwrap_or_else(|| "I couldn't come up with an answer to that.".to_string());
    cmd.create_followup(
        &ctx.http,
        CreateInteractionResponseFollowup::new().content(first),
    )
    .await
    .map_err(DiscordGateway::map_err)?;

    // Remaining chunks go to the channel in order, one message each.
    let gateway = DiscordGateway::new(ctx);
    for chunk in chunks {
        gateway
            .send_message(ChannelId(cmd.channel_id.get()), &chunk)
            .await?;
    }
    Ok(())
}

async fn delete_class(ctx: &Context, cmd: &CommandInteraction, state: &Arc<AppState>) -> Result<()> {
    // Registration hides this from non-admins; dispatch still enforces it.
    let is_admin = cmd
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .is_some_and(|p| p.administrator());
    if !is_admin {
        return respond_ephemeral(ctx, cmd, "Only administrators can delete a class.").await;
    }

    let Some(group) = group_context(ctx, cmd).await? else {
        return respond_ephemeral(ctx, cmd, "Run this inside a channel of the class to delete.")
            .await;
    };

    respond_ephemeral(ctx, cmd, "Deleting class...").await?;

    let gateway = Arc::new(DiscordGateway::new(ctx));
    let groups = GroupManager::new(state.cfg.guild_id, gateway);
    groups
        .delete_group(group.category, state.cfg.delete_delay)
        .await?;

    let event = AuditEvent::group_deleted(cmd.user.id.get(), &group.canonical);
    if let Err(e) = state.audit.write(event) {
        tracing::warn!("failed to write group_deleted audit event: {e}");
    }
    Ok(())
}

fn is_scratch_channel_name(name: &str) -> bool {
    name.ends_with("-classes")
}

async fn respond_ephemeral(ctx: &Context, cmd: &CommandInteraction, text: &str) -> Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        ),
    )
    .await
    .map_err(DiscordGateway::map_err)
}

/// Best-effort generic failure reply; works whether or not the command
/// already acknowledged the interaction.
async fn report_failure(ctx: &Context, cmd: &CommandInteraction) {
    const TEXT: &str = "Something went wrong running that command.";
    if respond_ephemeral(ctx, cmd, TEXT).await.is_ok() {
        return;
    }
    let _ = cmd
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(TEXT)
                .ephemeral(true),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_channel_names() {
        assert!(is_scratch_channel_name("kaden-classes"));
        assert!(!is_scratch_channel_name("💬-discussion"));
        assert!(!is_scratch_channel_name("general"));
    }
}
