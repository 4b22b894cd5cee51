use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{ChannelId, GuildId, MessageId},
    errors::Error,
    Result,
};

/// Typed configuration for the bot.
///
/// All fixed identifiers (the one community, the announcement messages) live
/// here; handlers receive this struct instead of reaching for globals.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub discord_bot_token: String,
    pub guild_id: GuildId,

    // Announcement messages members react to in order to (re-)enroll.
    pub announce_channel_id: ChannelId,
    pub add_classes_message_id: MessageId,
    pub get_started_message_id: Option<MessageId>,

    // Completion API (optional; /help is disabled without it)
    pub openai_api_key: Option<String>,
    pub help_available: bool,
    pub help_preamble: String,
    pub completion_model: String,
    pub completion_max_tokens: u32,
    pub completion_temperature: f32,

    // Dialogue timing
    pub prompt_timeout: Duration,
    pub reap_delay: Duration,
    pub delete_delay: Duration,

    // Discord message limit (chunk size for relayed answers)
    pub message_chunk_limit: usize,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let discord_bot_token = env_str("DISCORD_BOT_TOKEN").unwrap_or_default();
        if discord_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let guild_id = GuildId(require_u64("GUILD_ID")?);
        let announce_channel_id = ChannelId(require_u64("ANNOUNCE_CHANNEL_ID")?);
        let add_classes_message_id = MessageId(require_u64("ADD_CLASSES_MESSAGE_ID")?);
        let get_started_message_id = env_parse::<u64>("GET_STARTED_MESSAGE_ID").map(MessageId);

        // Optional completion provider
        let openai_api_key = env_str("OPENAI_API_KEY").and_then(non_empty);
        let help_available = openai_api_key.is_some();
        let help_preamble = build_help_preamble();
        let completion_model =
            env_str("COMPLETION_MODEL").unwrap_or("gpt-3.5-turbo-instruct".to_string());
        let completion_max_tokens = env_parse::<u32>("COMPLETION_MAX_TOKENS").unwrap_or(512).min(4096);
        let completion_temperature = env_parse::<f32>("COMPLETION_TEMPERATURE").unwrap_or(0.7);

        // Timeouts and constants
        let prompt_timeout = Duration::from_secs(env_parse("PROMPT_TIMEOUT_SECS").unwrap_or(60));
        let reap_delay = Duration::from_secs(env_parse("REAP_DELAY_SECS").unwrap_or(15));
        let delete_delay = Duration::from_secs(env_parse("DELETE_DELAY_SECS").unwrap_or(10));

        let message_chunk_limit = env_parse("MESSAGE_CHUNK_LIMIT").unwrap_or(2000);

        // Audit logging
        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/classbot-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            discord_bot_token,
            guild_id,
            announce_channel_id,
            add_classes_message_id,
            get_started_message_id,
            openai_api_key,
            help_available,
            help_preamble,
            completion_model,
            completion_max_tokens,
            completion_temperature,
            prompt_timeout,
            reap_delay,
            delete_delay,
            message_chunk_limit,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn build_help_preamble() -> String {
    const BASE: &str = "You are the assistant bot of a university class Discord server.\n\
Members use the server to find per-class discussion, questions and resources channels.\n\
Answer the following question about the server briefly and helpfully.";

    let Some(ctx) = env_str("HELP_CONTEXT").and_then(non_empty) else {
        return BASE.to_string();
    };

    format!("{BASE}\n\nAdditional context:\n{ctx}")
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn require_u64(key: &str) -> Result<u64> {
    env_parse::<u64>(key).ok_or_else(|| {
        Error::Config(format!("{key} environment variable is required (numeric id)"))
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
