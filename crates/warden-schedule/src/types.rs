//! Routine/Reminder/Webhook entry types (§3.1, §3.1 supplement) and their
//! markdown-header codec: serialize to `serde_yaml::Mapping` omitting any
//! field equal to its default, parse back tolerating unknown keys.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};
use warden_core::policy::{ForkPolicy, ToolFilter, UpdateMainSession};
use warden_core::types::ShortId;

use crate::error::{Result, SchedulerError};

// --- header helpers ---------------------------------------------------

fn get_str(h: &Mapping, key: &str) -> Option<String> {
    h.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn get_bool(h: &Mapping, key: &str, default: bool) -> bool {
    h.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn get_u32(h: &Mapping, key: &str, default: u32) -> u32 {
    h.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(default)
}

fn get_str_list(h: &Mapping, key: &str) -> Vec<String> {
    h.get(key)
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|x| x.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn set_str(h: &mut Mapping, key: &str, value: &str) {
    h.insert(Value::String(key.to_string()), Value::String(value.to_string()));
}

fn set_bool_if_ne(h: &mut Mapping, key: &str, value: bool, default: bool) {
    if value != default {
        h.insert(Value::String(key.to_string()), Value::Bool(value));
    }
}

fn set_u32_if_ne(h: &mut Mapping, key: &str, value: u32, default: u32) {
    if value != default {
        h.insert(Value::String(key.to_string()), Value::Number(value.into()));
    }
}

fn set_opt_str(h: &mut Mapping, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        set_str(h, key, v);
    }
}

fn set_str_list(h: &mut Mapping, key: &str, values: &[String]) {
    if !values.is_empty() {
        h.insert(
            Value::String(key.to_string()),
            Value::Sequence(values.iter().map(|s| Value::String(s.clone())).collect()),
        );
    }
}

fn parse_policy(h: &Mapping) -> Result<ForkPolicy> {
    let update_main_session = match get_str(h, "update_main_session").as_deref() {
        Some("always") => UpdateMainSession::Always,
        Some("on_ping") | None => UpdateMainSession::OnPing,
        Some("freely") => UpdateMainSession::Freely,
        Some("blocked") => UpdateMainSession::Blocked,
        Some(other) => {
            return Err(SchedulerError::InvalidCron {
                expr: other.to_string(),
                reason: "unknown update_main_session value".to_string(),
            })
        }
    };
    let allow_ping = get_bool(h, "allow_ping", true);
    let allowed = get_str_list(h, "allowed_tools");
    let blocked = get_str_list(h, "blocked_tools");
    let tool_filter =
        ToolFilter::new(allowed, blocked).map_err(|_| SchedulerError::ToolFilterConflict)?;
    Ok(ForkPolicy {
        update_main_session,
        allow_ping,
        tool_filter,
    })
}

fn write_policy(h: &mut Mapping, policy: &ForkPolicy) {
    if policy.update_main_session != UpdateMainSession::OnPing {
        let s = match policy.update_main_session {
            UpdateMainSession::Always => "always",
            UpdateMainSession::OnPing => "on_ping",
            UpdateMainSession::Freely => "freely",
            UpdateMainSession::Blocked => "blocked",
        };
        set_str(h, "update_main_session", s);
    }
    set_bool_if_ne(h, "allow_ping", policy.allow_ping, true);
    match &policy.tool_filter {
        ToolFilter::Unrestricted => {}
        ToolFilter::Allow(list) => set_str_list(h, "allowed_tools", list),
        ToolFilter::Block(list) => set_str_list(h, "blocked_tools", list),
    }
}

// --- Routine ------------------------------------------------------------

/// A recurring background/foreground task (§3.1).
#[derive(Debug, Clone)]
pub struct Routine {
    pub id: ShortId,
    pub message: String,
    pub cron: String,
    pub description: Option<String>,
    pub background: bool,
    pub skip_if_busy: bool,
    pub model: Option<String>,
    pub isolated: bool,
    pub thinking: bool,
    pub policy: ForkPolicy,
}

impl Routine {
    pub fn to_header(&self) -> Mapping {
        let mut h = Mapping::new();
        set_str(&mut h, "id", self.id.as_str());
        set_str(&mut h, "cron", &self.cron);
        set_opt_str(&mut h, "description", &self.description);
        set_bool_if_ne(&mut h, "background", self.background, false);
        set_bool_if_ne(&mut h, "skip_if_busy", self.skip_if_busy, false);
        set_opt_str(&mut h, "model", &self.model);
        set_bool_if_ne(&mut h, "isolated", self.isolated, false);
        set_bool_if_ne(&mut h, "thinking", self.thinking, true);
        write_policy(&mut h, &self.policy);
        h
    }

    pub fn from_header(h: &Mapping, body: &str) -> Result<Self> {
        let id = get_str(h, "id").ok_or(SchedulerError::MissingField("id"))?;
        let cron = get_str(h, "cron").ok_or(SchedulerError::MissingField("cron"))?;
        Ok(Self {
            id: ShortId::from(id),
            message: body.to_string(),
            cron,
            description: get_str(h, "description"),
            background: get_bool(h, "background", false),
            skip_if_busy: get_bool(h, "skip_if_busy", false),
            model: get_str(h, "model"),
            isolated: get_bool(h, "isolated", false),
            thinking: get_bool(h, "thinking", true),
            policy: parse_policy(h)?,
        })
    }

    /// File path the agent can `Read` to see this entry (§4.I.1).
    pub fn relative_path(&self) -> String {
        format!("routines/{}.md", self.id)
    }
}

// --- Reminder -------------------------------------------------------------

/// A one-shot task, possibly one link in a chain (§3.1, §4.F).
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: ShortId,
    pub message: String,
    pub run_at: DateTime<Utc>,
    pub description: Option<String>,
    pub background: bool,
    pub skip_if_busy: bool,
    pub model: Option<String>,
    pub isolated: bool,
    pub thinking: bool,
    pub policy: ForkPolicy,
    pub chain_depth: u32,
    pub max_chain: u32,
    pub chain_parent: Option<ShortId>,
}

impl Reminder {
    /// Validates `chain_depth <= max_chain` (§3.1 invariant) at
    /// construction rather than letting it propagate silently.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ShortId,
        message: String,
        run_at: DateTime<Utc>,
        description: Option<String>,
        background: bool,
        skip_if_busy: bool,
        model: Option<String>,
        isolated: bool,
        thinking: bool,
        policy: ForkPolicy,
        chain_depth: u32,
        max_chain: u32,
        chain_parent: Option<ShortId>,
    ) -> Result<Self> {
        if chain_depth > max_chain {
            return Err(SchedulerError::ChainDepthExceedsMax {
                depth: chain_depth,
                max: max_chain,
            });
        }
        Ok(Self {
            id,
            message,
            run_at,
            description,
            background,
            skip_if_busy,
            model,
            isolated,
            thinking,
            policy,
            chain_depth,
            max_chain,
            chain_parent,
        })
    }

    pub fn to_header(&self) -> Mapping {
        let mut h = Mapping::new();
        set_str(&mut h, "id", self.id.as_str());
        set_str(&mut h, "run_at", &self.run_at.to_rfc3339());
        set_opt_str(&mut h, "description", &self.description);
        set_bool_if_ne(&mut h, "background", self.background, false);
        set_bool_if_ne(&mut h, "skip_if_busy", self.skip_if_busy, false);
        set_opt_str(&mut h, "model", &self.model);
        set_bool_if_ne(&mut h, "isolated", self.isolated, false);
        set_bool_if_ne(&mut h, "thinking", self.thinking, true);
        write_policy(&mut h, &self.policy);
        set_u32_if_ne(&mut h, "chain_depth", self.chain_depth, 0);
        set_u32_if_ne(&mut h, "max_chain", self.max_chain, 0);
        if let Some(parent) = &self.chain_parent {
            set_str(&mut h, "chain_parent", parent.as_str());
        }
        h
    }

    pub fn from_header(h: &Mapping, body: &str) -> Result<Self> {
        let id = get_str(h, "id").ok_or(SchedulerError::MissingField("id"))?;
        let run_at_str = get_str(h, "run_at").ok_or(SchedulerError::MissingField("run_at"))?;
        let run_at = DateTime::parse_from_rfc3339(&run_at_str)
            .map_err(|e| SchedulerError::InvalidCron {
                expr: run_at_str.clone(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);
        let chain_depth = get_u32(h, "chain_depth", 0);
        let max_chain = get_u32(h, "max_chain", 0);
        if chain_depth > max_chain {
            return Err(SchedulerError::ChainDepthExceedsMax {
                depth: chain_depth,
                max: max_chain,
            });
        }
        Ok(Self {
            id: ShortId::from(id),
            message: body.to_string(),
            run_at,
            description: get_str(h, "description"),
            background: get_bool(h, "background", false),
            skip_if_busy: get_bool(h, "skip_if_busy", false),
            model: get_str(h, "model"),
            isolated: get_bool(h, "isolated", false),
            thinking: get_bool(h, "thinking", true),
            policy: parse_policy(h)?,
            chain_depth,
            max_chain,
            chain_parent: get_str(h, "chain_parent").map(ShortId::from),
        })
    }

    pub fn relative_path(&self) -> String {
        format!("reminders/{}.md", self.id)
    }

    /// Whether `follow_up_chain` may still be offered (§4.F).
    pub fn can_follow_up(&self) -> bool {
        self.max_chain > 0 && self.chain_depth < self.max_chain
    }
}

// --- WebhookSpec ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldType {
    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldType::String),
            "integer" => Some(FieldType::Integer),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }
}

/// Validation schema for one webhook payload field (SPEC_FULL.md §3.1
/// supplement — flatter than a nested JSON-Schema `properties` tree).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub max_length: Option<usize>,
    pub enum_values: Option<Vec<String>>,
}

/// A file-backed webhook trigger (§4.K, §6.3).
#[derive(Debug, Clone)]
pub struct WebhookSpec {
    pub id: String,
    pub message: String,
    pub fields: HashMap<String, FieldSpec>,
    pub isolated: bool,
    pub model: Option<String>,
    pub thinking: bool,
    pub policy: ForkPolicy,
}

impl WebhookSpec {
    pub fn to_header(&self) -> Mapping {
        let mut h = Mapping::new();
        set_str(&mut h, "id", &self.id);
        set_bool_if_ne(&mut h, "isolated", self.isolated, false);
        set_opt_str(&mut h, "model", &self.model);
        set_bool_if_ne(&mut h, "thinking", self.thinking, true);
        write_policy(&mut h, &self.policy);

        let mut fields_map = Mapping::new();
        for (name, spec) in &self.fields {
            let mut fm = Mapping::new();
            set_str(&mut fm, "type", spec.field_type.as_str());
            set_bool_if_ne(&mut fm, "required", spec.required, false);
            if let Some(max) = spec.max_length {
                fm.insert(Value::String("max_length".into()), Value::Number(max.into()));
            }
            if let Some(values) = &spec.enum_values {
                fields_map.insert(
                    Value::String(name.clone()),
                    Value::Mapping({
                        let mut m = fm.clone();
                        m.insert(
                            Value::String("enum".into()),
                            Value::Sequence(values.iter().map(|v| Value::String(v.clone())).collect()),
                        );
                        m
                    }),
                );
            } else {
                fields_map.insert(Value::String(name.clone()), Value::Mapping(fm));
            }
        }
        h.insert(Value::String("fields".into()), Value::Mapping(fields_map));
        h
    }

    pub fn from_header(h: &Mapping, body: &str) -> Result<Self> {
        let id = get_str(h, "id").ok_or(SchedulerError::MissingField("id"))?;
        let mut fields = HashMap::new();
        if let Some(Value::Mapping(fmap)) = h.get("fields") {
            for (k, v) in fmap {
                let name = k.as_str().unwrap_or_default().to_string();
                let Value::Mapping(fm) = v else { continue };
                let field_type = fm
                    .get("type")
                    .and_then(|t| t.as_str())
                    .and_then(FieldType::parse)
                    .unwrap_or(FieldType::String);
                let required = fm.get("required").and_then(|r| r.as_bool()).unwrap_or(false);
                let max_length = fm.get("max_length").and_then(|m| m.as_u64()).map(|v| v as usize);
                let enum_values = fm.get("enum").and_then(|e| e.as_sequence()).map(|seq| {
                    seq.iter()
                        .filter_map(|x| x.as_str().map(String::from))
                        .collect()
                });
                fields.insert(
                    name,
                    FieldSpec {
                        field_type,
                        required,
                        max_length,
                        enum_values,
                    },
                );
            }
        }
        Ok(Self {
            id,
            message: body.to_string(),
            fields,
            isolated: get_bool(h, "isolated", false),
            model: get_str(h, "model"),
            thinking: get_bool(h, "thinking", true),
            policy: parse_policy(h)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn routine_round_trips_through_header() {
        let r = Routine {
            id: ShortId::from("abc12345"),
            message: "morning briefing".to_string(),
            cron: "0 9 * * 1-5".to_string(),
            description: Some("Weekday briefing".to_string()),
            background: true,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        let header = r.to_header();
        let back = Routine::from_header(&header, &r.message).unwrap();
        assert_eq!(back.id, r.id);
        assert_eq!(back.cron, r.cron);
        assert_eq!(back.background, r.background);
        assert_eq!(back.description, r.description);
    }

    #[test]
    fn routine_omits_default_fields() {
        let r = Routine {
            id: ShortId::from("abc12345"),
            message: "m".to_string(),
            cron: "* * * * *".to_string(),
            description: None,
            background: false,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        let header = r.to_header();
        assert!(!header.contains_key("background"));
        assert!(!header.contains_key("thinking"));
        assert!(!header.contains_key("isolated"));
    }

    #[test]
    fn reminder_rejects_chain_depth_over_max() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let err = Reminder::new(
            ShortId::from("a"),
            "m".into(),
            now,
            None,
            false,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            3,
            2,
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn reminder_round_trips_chain_fields() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let r = Reminder::new(
            ShortId::from("child123"),
            "check on it".into(),
            now,
            None,
            true,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            1,
            2,
            Some(ShortId::from("root1234")),
        )
        .unwrap();
        let header = r.to_header();
        let back = Reminder::from_header(&header, &r.message).unwrap();
        assert_eq!(back.chain_depth, 1);
        assert_eq!(back.max_chain, 2);
        assert_eq!(back.chain_parent.unwrap().as_str(), "root1234");
    }

    #[test]
    fn webhook_round_trips_fields() {
        let mut fields = HashMap::new();
        fields.insert(
            "repo".to_string(),
            FieldSpec {
                field_type: FieldType::String,
                required: true,
                max_length: Some(200),
                enum_values: None,
            },
        );
        let spec = WebhookSpec {
            id: "ci".to_string(),
            message: "CI for {repo}.".to_string(),
            fields,
            isolated: true,
            model: Some("haiku".to_string()),
            thinking: true,
            policy: ForkPolicy::default(),
        };
        let header = spec.to_header();
        let back = WebhookSpec::from_header(&header, &spec.message).unwrap();
        assert_eq!(back.id, "ci");
        let repo = back.fields.get("repo").unwrap();
        assert!(repo.required);
        assert_eq!(repo.max_length, Some(200));
    }
}
