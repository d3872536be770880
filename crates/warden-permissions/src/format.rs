//! Tool-use label formatting shared between the approval message and any
//! log line referencing a pending tool call.

const MCP_DISCORD_PREFIX: &str = "mcp__discord__";

/// Tool name → input key(s) whose value makes an informative label.
fn label_keys(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "Read" => Some(&["file_path"]),
        "Write" => Some(&["file_path"]),
        "Edit" => Some(&["file_path"]),
        "Bash" => Some(&["command"]),
        "Grep" => Some(&["pattern", "path"]),
        "Glob" => Some(&["pattern"]),
        "WebSearch" => Some(&["query"]),
        "WebFetch" => Some(&["url"]),
        "Task" => Some(&["description"]),
        _ => None,
    }
}

/// Reduce a path to its last two components.
fn shorten_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2..].join("/")
    } else {
        path.to_string()
    }
}

/// Escape characters that break Discord italic/bold markdown.
fn escape_md(s: &str) -> String {
    s.replace('*', "\\*").replace('_', "\\_")
}

/// Build a descriptive tool-use label like `Write(reminders/foo.md)`.
/// Unparsable or unrecognized input falls back to the bare tool name.
pub fn format_tool_label(name: &str, input_json: &str) -> String {
    if let Some(stripped) = name.strip_prefix(MCP_DISCORD_PREFIX) {
        return stripped.to_string();
    }

    let Some(keys) = label_keys(name) else {
        return name.to_string();
    };

    let input: serde_json::Value = if input_json.is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        match serde_json::from_str(input_json) {
            Ok(v) => v,
            Err(_) => return name.to_string(),
        }
    };

    let mut parts = Vec::new();
    for key in keys {
        let Some(val) = input.get(*key).and_then(|v| v.as_str()) else {
            continue;
        };
        if val.is_empty() {
            continue;
        }
        let rendered = match *key {
            "file_path" => shorten_path(val),
            "command" => val.lines().next().unwrap_or("").chars().take(50).collect(),
            _ => val.to_string(),
        };
        parts.push(escape_md(&rendered));
    }

    if parts.is_empty() {
        name.to_string()
    } else {
        format!("{name}({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_mcp_tools_drop_their_prefix() {
        assert_eq!(format_tool_label("mcp__discord__ping_user", "{}"), "ping_user");
    }

    #[test]
    fn read_shows_shortened_path() {
        let label = format_tool_label("Read", r#"{"file_path": "/home/user/reminders/foo.md"}"#);
        assert_eq!(label, "Read(reminders/foo.md)");
    }

    #[test]
    fn bash_truncates_to_first_line_and_fifty_chars() {
        let long = "a".repeat(80);
        let label = format_tool_label("Bash", &format!(r#"{{"command": "{long}\nrest"}}"#));
        assert_eq!(label, format!("Bash({})", "a".repeat(50)));
    }

    #[test]
    fn unrecognized_tool_falls_back_to_bare_name() {
        assert_eq!(format_tool_label("mystery_tool", "{}"), "mystery_tool");
    }

    #[test]
    fn escapes_markdown_emphasis_characters() {
        let label = format_tool_label("Bash", r#"{"command": "echo *hi* _there_"}"#);
        assert_eq!(label, "Bash(echo \\*hi\\* \\_there\\_)");
    }
}
