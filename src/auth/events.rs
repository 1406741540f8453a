//! Security event schema and sinks.
//!
//! Every component of the auth core reports to a [`SecurityEventSink`]. The
//! log line shape is a contract with external monitoring: one JSON object
//! per line with exactly `{timestamp, event, user_id, user_type, ip,
//! user_agent, data}`. Events are append-only; nothing in this core mutates
//! or deletes them once emitted. Retention and day-partitioning belong to
//! the log transport, not to this module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};
use uuid::Uuid;

use super::account::Role;
use super::types::ClientInfo;

pub const MAX_USER_AGENT_BYTES: usize = 255;

#[derive(Clone, Debug, Serialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub event: &'static str,
    pub user_id: Option<Uuid>,
    pub user_type: Option<Role>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub data: serde_json::Map<String, Value>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(event: &'static str, client: &ClientInfo) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            user_id: None,
            user_type: None,
            ip: client.ip.clone(),
            user_agent: client.user_agent.as_deref().map(truncate_user_agent),
            data: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_account(mut self, user_id: Uuid, user_type: Role) -> Self {
        self.user_id = Some(user_id);
        self.user_type = Some(user_type);
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

fn truncate_user_agent(user_agent: &str) -> String {
    if user_agent.len() <= MAX_USER_AGENT_BYTES {
        return user_agent.to_string();
    }
    let mut end = MAX_USER_AGENT_BYTES;
    while !user_agent.is_char_boundary(end) {
        end -= 1;
    }
    user_agent[..end].to_string()
}

pub trait SecurityEventSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

/// Emits one JSON object per line through `tracing` under the
/// `security_event` target; the subscriber decides where lines land.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl SecurityEventSink for TracingEventSink {
    fn emit(&self, event: SecurityEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => info!(target: "security_event", "{line}"),
            Err(err) => error!("Failed to serialize security event: {err}"),
        }
    }
}

/// Captures events in memory so tests can assert on what was emitted.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl SecurityEventSink for MemoryEventSink {
    fn emit(&self, event: SecurityEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ClientInfo {
        ClientInfo {
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    #[test]
    fn serialized_shape_matches_the_log_contract() {
        let event = SecurityEvent::new("auth_success", &client())
            .with_account(Uuid::nil(), Role::Teacher)
            .with_data("remember_me", json!(true));
        let value: Value = serde_json::to_value(&event).expect("serialize");
        let object = value.as_object().expect("object");

        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "data",
                "event",
                "ip",
                "timestamp",
                "user_agent",
                "user_id",
                "user_type"
            ]
        );
        assert_eq!(object["event"], "auth_success");
        assert_eq!(object["user_type"], "teacher");
        assert_eq!(object["data"]["remember_me"], json!(true));
    }

    #[test]
    fn user_agent_is_truncated_on_a_char_boundary() {
        let long = format!("{}é", "a".repeat(254));
        let truncated = truncate_user_agent(&long);
        assert_eq!(truncated.len(), 254);
        assert!(truncated.chars().all(|c| c == 'a'));

        let short = "curl/8.0";
        assert_eq!(truncate_user_agent(short), short);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemoryEventSink::new();
        sink.emit(SecurityEvent::new("auth_failed", &client()));
        sink.emit(SecurityEvent::new("auth_success", &client()));
        assert_eq!(sink.names(), vec!["auth_failed", "auth_success"]);
    }
}
