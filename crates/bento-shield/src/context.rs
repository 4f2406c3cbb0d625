use serde_json::Value;

/// Number of past turns replayed into the prompt.
pub const CONTEXT_TURNS: usize = 10;

/// One past exchange, taken from the audit log.
pub struct Turn<'a> {
    pub payload: &'a Value,
    pub ai_output: Option<&'a str>,
}

/// First user-text field of a payload.
pub fn user_text(payload: &Value) -> Option<&str> {
    ["input", "prompt", "message"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Render prior turns, oldest first, as a prompt prefix. Turns missing
/// either side are skipped; returns an empty string when nothing remains.
pub fn build_conversation_context(turns: &[Turn<'_>]) -> String {
    let start = turns.len().saturating_sub(CONTEXT_TURNS);
    let mut lines = Vec::new();

    for turn in &turns[start..] {
        let (Some(user), Some(ai)) = (user_text(turn.payload), turn.ai_output.filter(|s| !s.is_empty()))
        else {
            continue;
        };
        lines.push(format!("User: {}", user));
        lines.push(format!("AI: {}", ai));
    }

    if lines.is_empty() {
        return String::new();
    }
    format!("Previous Conversation:\n{}\n\n", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_turns_in_order() {
        let first = json!({"input": "hi"});
        let second = json!({"prompt": "and then?"});
        let turns = [
            Turn { payload: &first, ai_output: Some("hello") },
            Turn { payload: &second, ai_output: Some("nothing") },
        ];
        assert_eq!(
            build_conversation_context(&turns),
            "Previous Conversation:\nUser: hi\nAI: hello\nUser: and then?\nAI: nothing\n\n"
        );
    }

    #[test]
    fn skips_incomplete_turns() {
        let aborted = json!({"event": "user_aborted"});
        let clean = json!({"input": "hi"});
        let turns = [
            Turn { payload: &aborted, ai_output: Some("x") },
            Turn { payload: &clean, ai_output: None },
        ];
        assert_eq!(build_conversation_context(&turns), "");
    }

    #[test]
    fn keeps_only_latest_turns() {
        let payloads: Vec<Value> = (0..12).map(|i| json!({"input": format!("q{}", i)})).collect();
        let turns: Vec<Turn<'_>> = payloads
            .iter()
            .map(|p| Turn { payload: p, ai_output: Some("a") })
            .collect();
        let rendered = build_conversation_context(&turns);
        assert!(!rendered.contains("User: q1\n"));
        assert!(rendered.contains("User: q2\n"));
        assert!(rendered.contains("User: q11\n"));
    }
}
