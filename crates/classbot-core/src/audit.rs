//! Append-only audit log of what the bot did on whose behalf.
//!
//! One line (JSON mode) or block (plaintext mode) per event; large payloads
//! are truncated before writing.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{errors::Error, Result};

const AUDIT_MAX_TEXT: usize = 500;

/// RFC3339 timestamp in UTC (for logs/telemetry).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn base(event: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: None,
            username: None,
            trigger: None,
            declared: None,
            timed_out: None,
            class_name: None,
            granted: None,
            error: None,
            context: None,
        }
    }

    pub fn enrollment(
        user_id: u64,
        username: &str,
        trigger: &str,
        declared: u8,
        timed_out: bool,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            username: Some(username.to_string()),
            trigger: Some(trigger.to_string()),
            declared: Some(declared),
            timed_out: Some(timed_out),
            ..Self::base("enrollment")
        }
    }

    pub fn group_created(user_id: u64, username: &str, class_name: &str) -> Self {
        Self {
            user_id: Some(user_id),
            username: Some(username.to_string()),
            class_name: Some(class_name.to_string()),
            ..Self::base("group_created")
        }
    }

    pub fn group_deleted(user_id: u64, class_name: &str) -> Self {
        Self {
            user_id: Some(user_id),
            class_name: Some(class_name.to_string()),
            ..Self::base("group_deleted")
        }
    }

    pub fn access(user_id: u64, class_name: &str, granted: bool) -> Self {
        Self {
            user_id: Some(user_id),
            class_name: Some(class_name.to_string()),
            granted: Some(granted),
            ..Self::base("access")
        }
    }

    pub fn error(user_id: u64, username: &str, error: &str, context: Option<&str>) -> Self {
        Self {
            user_id: Some(user_id),
            username: Some(username.to_string()),
            error: Some(error.to_string()),
            context: context.map(|s| s.to_string()),
            ..Self::base("error")
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        // Clip potentially large payloads before they hit the log.
        if let Some(s) = &event.error {
            event.error = Some(clip(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.context {
            event.context = Some(clip(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::Platform(
                "audit event is not a JSON object".to_string(),
            ));
        };

        let mut out = format!("\n---- {} ", event.event);
        out.push_str(&"-".repeat(40usize.saturating_sub(event.event.len())));
        for (k, v) in obj {
            if k == "event" {
                continue;
            }
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&display_value(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

/// Clip a payload to `max_len` characters, marking the cut.
pub fn clip(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn display_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    #[test]
    fn clip_marks_the_cut() {
        let s = "a".repeat(AUDIT_MAX_TEXT + 10);
        let t = clip(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert!(t.len() >= AUDIT_MAX_TEXT);
    }

    #[test]
    fn json_mode_writes_one_line_per_event() {
        let log = AuditLogger::new(tmp_file("classbot-audit-test"), true);
        log.write(AuditEvent::enrollment(1, "kaden", "announcement", 2, false))
            .unwrap();
        log.write(AuditEvent::access(1, "cs-1026", true)).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("\"event\":\"enrollment\""));
        assert!(written.contains("\"class_name\":\"cs-1026\""));
    }

    #[test]
    fn plaintext_mode_writes_labeled_blocks() {
        let log = AuditLogger::new(tmp_file("classbot-audit-text-test"), false);
        log.write(AuditEvent::group_deleted(9, "cs-1026")).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("---- group_deleted"));
        assert!(written.contains("class_name: cs-1026"));
    }

    #[test]
    fn error_payloads_are_truncated_on_write() {
        let log = AuditLogger::new(tmp_file("classbot-audit-err-test"), true);
        let long = "x".repeat(AUDIT_MAX_TEXT + 50);
        log.write(AuditEvent::error(7, "kaden", &long, Some("enrollment")))
            .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("..."));
    }
}
