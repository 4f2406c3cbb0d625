//! Sensitive-data detection and replacement.
//!
//! Three passes run in order over each string: custom keywords, the fixed
//! regex detectors, then contextual named entities. Regex and keyword hits are
//! located in the original text; entity hits are located in the text as it
//! stands after the first two passes.

use std::sync::OnceLock;

use bento_types::models::{Hit, HitContext, HitKind, PolicyConfig};
use regex::{NoExpand, Regex, RegexBuilder};
use serde_json::Value;

/// How matched values are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionMode {
    /// `[EMAIL_REDACTED]`, `[PERSON_REDACTED]`, ...
    Redact,
    /// Deterministic synthetic stand-ins (`user@example.com`, `Alex`, ...).
    Swap,
}

/// Lines of context kept on each side of a hit.
const CONTEXT_LINES: usize = 2;

/// Characters before an entity inspected for a personal trigger.
const TRIGGER_WINDOW: usize = 50;

/// A trigger never reaches across these.
const SENTENCE_BREAKS: &[char] = &['.', '?', '!', ';', '\n'];

/// Compiled detectors, applied in this order.
fn detectors() -> &'static [(HitKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(HitKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let raw = [
            (HitKind::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b"),
            (HitKind::Phone, r"\b(?:\+?1?[-.]?\(?\d{3}\)?[-.]?)?\d{3}[-.]?\d{4}\b"),
            (HitKind::CreditCard, r"\b(?:\d{4}[- ]?){3}\d{4}\b"),
            (HitKind::ApiKey, r"sk-[a-zA-Z0-9]{20,}"),
            (HitKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
        ];

        raw.into_iter()
            .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|r| (kind, r)))
            .collect()
    })
}

/// Runs of capitalised words, e.g. "Alice", "New York City".
fn entity_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b[A-Z][a-z][A-Za-z'-]*(?: [A-Z][a-z][A-Za-z'-]*)*").ok())
        .as_ref()
}

/// Well-known entities that are only redacted in a personal context.
const PUBLIC_WHITELIST: &[(&str, HitKind)] = &[
    ("madrid", HitKind::Location),
    ("london", HitKind::Location),
    ("paris", HitKind::Location),
    ("new york", HitKind::Location),
    ("mumbai", HitKind::Location),
    ("tokyo", HitKind::Location),
    ("berlin", HitKind::Location),
    ("google", HitKind::Org),
    ("apple", HitKind::Org),
    ("microsoft", HitKind::Org),
    ("amazon", HitKind::Org),
    ("meta", HitKind::Org),
    ("nvidia", HitKind::Org),
    ("python", HitKind::Org),
    ("javascript", HitKind::Org),
    ("react", HitKind::Org),
    ("nextjs", HitKind::Org),
    ("elon musk", HitKind::Person),
    ("bill gates", HitKind::Person),
    ("steve jobs", HitKind::Person),
    ("narendra modi", HitKind::Person),
    ("openai", HitKind::Org),
    ("groq", HitKind::Org),
    ("bento", HitKind::Org),
];

/// Phrases that mark the following entity as the user's own data, with the
/// entity type they imply.
const PERSONAL_TRIGGERS: &[(&str, HitKind)] = &[
    ("my", HitKind::Person),
    ("call me", HitKind::Person),
    ("name is", HitKind::Person),
    ("work at", HitKind::Org),
    ("office", HitKind::Org),
    ("desk", HitKind::Org),
    ("live", HitKind::Location),
    ("lives", HitKind::Location),
    ("living", HitKind::Location),
    ("staying", HitKind::Location),
    ("home", HitKind::Location),
    ("house", HitKind::Location),
    ("address", HitKind::Location),
    ("born", HitKind::Location),
    ("from", HitKind::Location),
    ("born in", HitKind::Location),
    ("stay at", HitKind::Location),
    ("stay in", HitKind::Location),
    ("reside", HitKind::Location),
    ("apartment", HitKind::Location),
    ("landmark", HitKind::Location),
];

/// Capitalised words that never start an entity.
const LEADING_STOPWORDS: &[&str] = &[
    "my", "me", "the", "an", "and", "but", "or", "he", "she", "we", "they", "it", "this", "that",
    "hi", "hello", "hey", "please", "thanks", "in", "at", "on", "from", "is", "am", "are", "to",
    "of", "for", "with", "our", "your", "his", "her", "their", "near", "by", "dear", "yes", "no",
    "what", "why", "how", "when", "where", "who", "which", "can", "could", "would", "should",
    "will", "shall", "may", "might", "must", "do", "does", "did", "also", "so", "then", "thank",
    "just", "ok", "okay", "sure", "there", "here", "if", "maybe", "now", "again", "let",
];

fn synthetic_values(kind: HitKind) -> &'static [&'static str] {
    match kind {
        HitKind::Person => &["Alex", "Jordan", "Taylor", "Morgan", "Casey"],
        HitKind::Org => &["Acme Corp", "Globex", "Initech", "Umbrella Corp", "Stark Ind"],
        HitKind::Location => &["Springfield", "Gotham", "Metropolis", "Atlantis", "Wakanda"],
        HitKind::Email => &["user@example.com", "contact@sample.org", "info@demo.net"],
        HitKind::Phone => &["+1-555-0123", "555-0199", "555-0100"],
        _ => &["DATA"],
    }
}

fn replacement(kind: HitKind, mode: RedactionMode, source: &str) -> String {
    match (mode, kind) {
        (RedactionMode::Redact, HitKind::CustomKeyword) => "[REDACTED]".to_string(),
        (RedactionMode::Swap, HitKind::CustomKeyword) => "PROJECT_X".to_string(),
        (RedactionMode::Redact, _) => format!("[{}_REDACTED]", kind.as_str().to_uppercase()),
        (RedactionMode::Swap, _) => {
            let options = synthetic_values(kind);
            options[source.chars().count() % options.len()].to_string()
        }
    }
}

/// 1-based line of the byte offset `at`.
fn line_number(text: &str, at: usize) -> usize {
    text[..at].matches('\n').count() + 1
}

fn context_for(lines: &[&str], line_number: usize) -> HitContext {
    let idx = line_number.saturating_sub(1).min(lines.len());
    let to_owned = |slice: &[&str]| slice.iter().map(|l| l.to_string()).collect::<Vec<_>>();
    let after_start = (idx + 1).min(lines.len());
    let after_end = (idx + 1 + CONTEXT_LINES).min(lines.len());

    HitContext {
        before: to_owned(&lines[idx.saturating_sub(CONTEXT_LINES)..idx]),
        matched: lines.get(idx).map(|l| l.to_string()).unwrap_or_default(),
        after: to_owned(&lines[after_start..after_end]),
    }
}

/// The trailing `TRIGGER_WINDOW` characters of `text[..end]`, lowercased and
/// cut back to the start of the entity's own sentence.
fn trigger_window(text: &str, end: usize) -> String {
    let head = &text[..end];
    let start = head
        .char_indices()
        .rev()
        .nth(TRIGGER_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window = &head[start..];
    let clause = match window.rfind(SENTENCE_BREAKS) {
        Some(i) => &window[i + 1..],
        None => window,
    };
    clause.to_lowercase()
}

/// Whether `window[at..at + len]` stands as whole words.
fn on_word_boundary(window: &str, at: usize, len: usize) -> bool {
    let before = window[..at].chars().next_back();
    let after = window[at + len..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// The trigger that ends closest to the entity, if any.
fn nearest_trigger(window: &str) -> Option<HitKind> {
    PERSONAL_TRIGGERS
        .iter()
        .filter_map(|(trigger, kind)| {
            window
                .rmatch_indices(trigger)
                .find(|(pos, _)| on_word_boundary(window, *pos, trigger.len()))
                .map(|(pos, _)| (pos + trigger.len(), *kind))
        })
        .max_by_key(|(end, _)| *end)
        .map(|(_, kind)| kind)
}

struct Entity {
    start: usize,
    end: usize,
    kind: HitKind,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    /// Redact one string. Returns the rewritten text and every hit found.
    pub fn redact_text(
        &self,
        text: &str,
        mode: RedactionMode,
        config: &PolicyConfig,
    ) -> (String, Vec<Hit>) {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut hits = Vec::new();
        let mut redacted = text.to_string();

        let hit_at = |kind: HitKind, value: &str, line: usize| Hit {
            kind,
            value: value.to_string(),
            line_number: line,
            context: context_for(&lines, line),
        };

        for keyword in config.custom_keywords.iter().filter(|k| !k.trim().is_empty()) {
            let Ok(pattern) = RegexBuilder::new(&regex::escape(keyword))
                .case_insensitive(true)
                .build()
            else {
                continue;
            };
            if !pattern.is_match(&redacted) {
                continue;
            }

            for m in pattern.find_iter(text) {
                hits.push(hit_at(HitKind::CustomKeyword, m.as_str(), line_number(text, m.start())));
            }
            let with = replacement(HitKind::CustomKeyword, mode, text);
            redacted = pattern.replace_all(&redacted, NoExpand(&with)).into_owned();
        }

        for (kind, pattern) in detectors() {
            if !config.is_enabled(*kind) {
                continue;
            }

            for m in pattern.find_iter(text) {
                hits.push(hit_at(*kind, m.as_str(), line_number(text, m.start())));
            }
            let with = replacement(*kind, mode, text);
            redacted = pattern.replace_all(&redacted, NoExpand(&with)).into_owned();
        }

        let entities = find_entities(&redacted, config);
        for entity in &entities {
            let value = &redacted[entity.start..entity.end];
            hits.push(hit_at(entity.kind, value, line_number(&redacted, entity.start)));
        }
        for entity in entities.iter().rev() {
            let with = replacement(entity.kind, mode, text);
            redacted.replace_range(entity.start..entity.end, &with);
        }

        (redacted, hits)
    }

    /// Redact every string leaf of a JSON value. Keys and non-string leaves
    /// are left untouched.
    pub fn redact_json(
        &self,
        value: &Value,
        mode: RedactionMode,
        config: &PolicyConfig,
    ) -> (Value, Vec<Hit>) {
        match value {
            Value::Object(map) => {
                let mut hits = Vec::new();
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, inner) in map {
                    let (redacted, found) = self.redact_json(inner, mode, config);
                    out.insert(key.clone(), redacted);
                    hits.extend(found);
                }
                (Value::Object(out), hits)
            }
            Value::Array(items) => {
                let mut hits = Vec::new();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let (redacted, found) = self.redact_json(item, mode, config);
                    out.push(redacted);
                    hits.extend(found);
                }
                (Value::Array(out), hits)
            }
            Value::String(s) => {
                let (redacted, hits) = self.redact_text(s, mode, config);
                (Value::String(redacted), hits)
            }
            other => (other.clone(), Vec::new()),
        }
    }
}

/// Contextual entities in `text`, in order of appearance.
///
/// An entity is only reported when one of the personal triggers occurs in
/// the window before it; its type comes from the whitelist when known,
/// otherwise from the nearest trigger.
fn find_entities(text: &str, config: &PolicyConfig) -> Vec<Entity> {
    let Some(pattern) = entity_pattern() else {
        return Vec::new();
    };

    let mut entities = Vec::new();
    for m in pattern.find_iter(text) {
        let mut start = m.start();
        let mut rest = m.as_str();

        // Drop leading function words ("Hi Alice" -> "Alice").
        loop {
            let (word, tail) = match rest.split_once(' ') {
                Some((w, t)) => (w, Some(t)),
                None => (rest, None),
            };
            if !LEADING_STOPWORDS.contains(&word.to_lowercase().as_str()) {
                break;
            }
            match tail {
                Some(t) => {
                    start += word.len() + 1;
                    rest = t;
                }
                None => {
                    rest = "";
                    break;
                }
            }
        }
        if rest.is_empty() {
            continue;
        }

        let Some(trigger_kind) = nearest_trigger(&trigger_window(text, start)) else {
            continue;
        };

        let lowered = rest.to_lowercase();
        let kind = PUBLIC_WHITELIST
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, kind)| *kind)
            .unwrap_or(trigger_kind);

        if !config.is_enabled(kind) {
            continue;
        }

        entities.push(Entity {
            start,
            end: m.end(),
            kind,
        });
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redact(text: &str) -> (String, Vec<Hit>) {
        Redactor::new().redact_text(text, RedactionMode::Redact, &PolicyConfig::default())
    }

    #[test]
    fn masks_email_and_phone() {
        let (out, hits) = redact("mail a.b@corp.io or ring 555-123-4567");
        assert_eq!(out, "mail [EMAIL_REDACTED] or ring [PHONE_REDACTED]");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, HitKind::Email);
        assert_eq!(hits[0].value, "a.b@corp.io");
        assert_eq!(hits[1].kind, HitKind::Phone);
    }

    #[test]
    fn detects_keys_and_ssn() {
        let (out, hits) = redact("key sk-abcdefghijklmnopqrstuvwx ssn 123-45-6789");
        assert_eq!(out, "key [API_KEY_REDACTED] ssn [SSN_REDACTED]");
        let kinds: Vec<_> = hits.iter().map(|h| h.kind).collect();
        assert_eq!(kinds, vec![HitKind::ApiKey, HitKind::Ssn]);
    }

    #[test]
    fn hit_carries_line_and_context_window() {
        let text = "one\ntwo\nthree\nmail x@y.com\nfive\nsix\nseven";
        let (_, hits) = redact(text);
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.line_number, 4);
        assert_eq!(hit.context.before, vec!["two", "three"]);
        assert_eq!(hit.context.matched, "mail x@y.com");
        assert_eq!(hit.context.after, vec!["five", "six"]);
    }

    #[test]
    fn context_is_clipped_at_text_edges() {
        let (_, hits) = redact("x@y.com\nlast");
        assert!(hits[0].context.before.is_empty());
        assert_eq!(hits[0].context.after, vec!["last"]);
    }

    #[test]
    fn custom_keywords_are_case_insensitive_literals() {
        let config = PolicyConfig {
            custom_keywords: vec!["falcon (v2)".into()],
            ..Default::default()
        };
        let redactor = Redactor::new();

        let (out, hits) =
            redactor.redact_text("Ship FALCON (V2) today", RedactionMode::Redact, &config);
        assert_eq!(out, "Ship [REDACTED] today");
        assert_eq!(hits[0].kind, HitKind::CustomKeyword);
        assert_eq!(hits[0].value, "FALCON (V2)");

        let (out, _) = redactor.redact_text("Ship falcon (v2) today", RedactionMode::Swap, &config);
        assert_eq!(out, "Ship PROJECT_X today");
    }

    #[test]
    fn swap_mode_picks_by_text_length() {
        let text = "write to x@y.com";
        let (out, _) =
            Redactor::new().redact_text(text, RedactionMode::Swap, &PolicyConfig::default());
        let options = synthetic_values(HitKind::Email);
        let expected = options[text.chars().count() % options.len()];
        assert_eq!(out, format!("write to {}", expected));
    }

    #[test]
    fn disabled_detector_is_skipped() {
        let config = PolicyConfig {
            redact_email: Some(false),
            ..Default::default()
        };
        let (out, hits) =
            Redactor::new().redact_text("x@y.com", RedactionMode::Redact, &config);
        assert_eq!(out, "x@y.com");
        assert!(hits.is_empty());
    }

    #[test]
    fn payment_category_covers_card_numbers() {
        let config = PolicyConfig {
            redact_payment: Some(false),
            ..Default::default()
        };
        let (out, _) =
            Redactor::new().redact_text("card 4111 1111 1111 1111", RedactionMode::Redact, &config);
        assert_eq!(out, "card 4111 1111 1111 1111");

        let (out, _) = redact("card 4111 1111 1111 1111");
        assert_eq!(out, "card [CREDIT_CARD_REDACTED]");
    }

    #[test]
    fn names_after_personal_trigger_are_people() {
        let (out, hits) = redact("Hello. My name is Alice Smith");
        assert_eq!(out, "Hello. My name is [PERSON_REDACTED]");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, HitKind::Person);
        assert_eq!(hits[0].value, "Alice Smith");
    }

    #[test]
    fn public_places_need_personal_context() {
        let (out, hits) = redact("Tell me about London");
        assert_eq!(out, "Tell me about London");
        assert!(hits.is_empty());

        let (out, hits) = redact("I live in London");
        assert_eq!(out, "I live in [GPE_REDACTED]");
        assert_eq!(hits[0].kind, HitKind::Location);
    }

    #[test]
    fn workplace_is_an_org_unless_disabled() {
        let (out, _) = redact("I work at Initrode Systems");
        assert_eq!(out, "I work at [ORG_REDACTED]");

        let config = PolicyConfig {
            redact_org: Some(false),
            ..Default::default()
        };
        let (out, hits) =
            Redactor::new().redact_text("I work at Initrode", RedactionMode::Redact, &config);
        assert_eq!(out, "I work at Initrode");
        assert!(hits.is_empty());
    }

    #[test]
    fn json_walk_touches_only_string_leaves() {
        let payload = json!({
            "input": "mail a@b.com",
            "nested": {"list": ["fine", "ssn 123-45-6789"]},
            "count": 5
        });
        let (out, hits) =
            Redactor::new().redact_json(&payload, RedactionMode::Redact, &PolicyConfig::default());
        assert_eq!(hits.len(), 2);
        assert_eq!(out["input"], "mail [EMAIL_REDACTED]");
        assert_eq!(out["nested"]["list"][0], "fine");
        assert_eq!(out["nested"]["list"][1], "ssn [SSN_REDACTED]");
        assert_eq!(out["count"], 5);
    }

    #[test]
    fn capitalised_words_in_later_sentences_are_not_entities() {
        for text in [
            "Can you review my code? What does it do?",
            "I work at home. Could you help?",
            "Fix my essay. Thanks. Also Rust is great",
            "Check my notes; Would this compile?",
        ] {
            let (out, hits) = redact(text);
            assert_eq!(out, text);
            assert!(hits.is_empty(), "{:?} produced {:?}", text, hits);
        }
    }

    #[test]
    fn triggers_match_whole_words_only() {
        let (out, hits) = redact("Please deliver Fresh Bread tomorrow");
        assert_eq!(out, "Please deliver Fresh Bread tomorrow");
        assert!(hits.is_empty());

        let (out, _) = redact("She lives in Springvale");
        assert_eq!(out, "She lives in [GPE_REDACTED]");
    }

    #[test]
    fn leading_question_words_are_dropped_from_entities() {
        let (out, hits) = redact("my friend Could Alice Smith come");
        assert_eq!(out, "my friend Could [PERSON_REDACTED] come");
        assert_eq!(hits[0].value, "Alice Smith");
    }

    #[test]
    fn clean_text_passes_through() {
        let (out, hits) = redact("What is the capital of France?");
        assert_eq!(out, "What is the capital of France?");
        assert!(hits.is_empty());
    }
}
