use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

pub const LOG_DIR_ENV: &str = "CONDUCTOR_LOG_DIR";
const RETENTION_ENV: &str = "CONDUCTOR_LOG_RETENTION_DAYS";
const DEFAULT_RETENTION_DAYS: u64 = 90;
const RESEARCH_LOG_FILE: &str = "research.jsonl";
const AUDIT_LOG_FILE: &str = "audit.jsonl";

static REDACTION_PATTERNS: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key".to_string(),
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret".to_string(),
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer".to_string(),
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token".to_string(),
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

#[derive(Serialize)]
struct ResearchLogRecord<'a> {
    timestamp: String,
    run_id: &'a str,
    event: &'a str,
    data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord<'a> {
    timestamp: String,
    run_id: &'a str,
    redactions: Vec<String>,
}

/// JSONL log of research events (`query`, `sub_query`, `content_found`,
/// `context`), partitioned by year and month.
#[derive(Debug, Clone)]
pub struct ResearchLog {
    base_dir: PathBuf,
    retention_days: u64,
}

impl ResearchLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// Log rooted at `CONDUCTOR_LOG_DIR`, if set.
    pub fn from_env() -> Option<Self> {
        let dir = std::env::var(LOG_DIR_ENV).ok().filter(|dir| !dir.is_empty())?;
        let retention = std::env::var(RETENTION_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        Some(Self::new(dir).with_retention_days(retention))
    }

    /// Zero disables pruning.
    pub fn with_retention_days(mut self, days: u64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn log_event(&self, run_id: &str, event: &str, data: Value) -> Result<()> {
        let timestamp = Utc::now();
        let mut redactions = BTreeSet::new();
        let data = sanitize_value(data, &mut redactions);
        let redactions: Vec<String> = redactions.into_iter().collect();

        let month_dir = self
            .base_dir
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()));

        let record = ResearchLogRecord {
            timestamp: timestamp.to_rfc3339(),
            run_id,
            event,
            data,
            redactions: redactions.clone(),
        };
        append_json_line(&month_dir.join(RESEARCH_LOG_FILE), &record)?;

        if !redactions.is_empty() {
            warn!(
                run_id = %run_id,
                event = %event,
                fields = ?redactions,
                "redacted potential secrets from research log"
            );
            let audit = AuditLogRecord {
                timestamp: record.timestamp.clone(),
                run_id,
                redactions,
            };
            append_json_line(&month_dir.join(AUDIT_LOG_FILE), &audit)?;
        }

        Ok(())
    }

    /// Delete log files older than the retention window. Run once per
    /// research run, not per event.
    pub fn prune_expired(&self) -> Result<()> {
        if self.retention_days == 0 || !self.base_dir.exists() {
            return Ok(());
        }
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.retention_days.saturating_mul(86_400)))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        prune_directory(&self.base_dir, cutoff)
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{}", line)
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_value(value: Value, redactions: &mut BTreeSet<String>) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize_text(&text, redactions)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_value(item, redactions))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, sanitize_value(item, redactions)))
                .collect(),
        ),
        other => other,
    }
}

fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert(name.clone());
        }
    }
    output
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}
