use std::time::Duration;

use assert_json_diff::{CompareMode, Config, assert_json_matches_no_panic};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use tracing::{debug, instrument};

use crate::{config::AbideConfig, http_message::HttpMessage, record::SnapshotId};

const CHAR_DIFF_TIMEOUT: Duration = Duration::from_secs(2);
const INSERT_STYLE: &str = "\u{1b}[32m";
const DELETE_STYLE: &str = "\u{1b}[31m";
const RESET_STYLE: &str = "\u{1b}[0m";

/// Which normalisation and diff path a snapshot goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    #[default]
    Generic,
    HttpJson,
}

/// Returns the rendered difference between a stored snapshot and a newly
/// computed value; an empty string means they match.
#[instrument(skip(existing, new, config), fields(id = %id, ?format))]
pub fn compare(
    id: &SnapshotId,
    existing: &str,
    new: &str,
    format: SnapshotFormat,
    config: &AbideConfig,
) -> String {
    let diff = match format {
        SnapshotFormat::Generic => compare_text(existing, new, config),
        SnapshotFormat::HttpJson => compare_http_json(existing, new, config),
    };
    debug!(matched = diff.is_empty(), "snapshot compared");
    diff
}

#[must_use]
pub fn compare_text(existing: &str, new: &str, config: &AbideConfig) -> String {
    if config.unified_diff {
        unified_diff(existing, new)
    } else {
        char_diff(existing, new)
    }
}

#[must_use]
pub fn unified_diff(existing: &str, new: &str) -> String {
    if existing == new {
        return String::new();
    }

    TextDiff::from_lines(existing, new)
        .unified_diff()
        .context_radius(3)
        .header("existing", "new")
        .to_string()
}

/// Character-level diff of both inputs, coloured with ANSI escapes.
#[must_use]
pub fn char_diff(existing: &str, new: &str) -> String {
    if existing == new {
        return String::new();
    }

    let diff = TextDiff::configure()
        .timeout(CHAR_DIFF_TIMEOUT)
        .diff_chars(existing, new);

    let mut runs: Vec<(ChangeTag, String)> = Vec::new();
    for change in diff.iter_all_changes() {
        let tag = change.tag();
        if let Some((_, text)) = runs.last_mut().filter(|(last, _)| *last == tag) {
            text.push_str(change.value());
        } else {
            runs.push((tag, change.value().to_string()));
        }
    }

    if runs.iter().all(|(tag, _)| *tag == ChangeTag::Equal) {
        return String::new();
    }

    let mut out = String::new();
    for (tag, text) in runs {
        match tag {
            ChangeTag::Equal => out.push_str(&text),
            ChangeTag::Insert => {
                out.push_str(INSERT_STYLE);
                out.push_str(&text);
                out.push_str(RESET_STYLE);
            }
            ChangeTag::Delete => {
                out.push_str(DELETE_STYLE);
                out.push_str(&text);
                out.push_str(RESET_STYLE);
            }
        }
    }
    out
}

/// Structural classification of two JSON bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonMatch {
    Full,
    /// The new body holds everything the existing one does, and more.
    Superset(String),
    NoMatch(String),
    ExistingInvalid,
    NewInvalid,
    BothInvalid,
}

#[must_use]
pub fn compare_json(existing: &str, new: &str) -> JsonMatch {
    let existing: Option<Value> = serde_json::from_str(existing).ok();
    let new: Option<Value> = serde_json::from_str(new).ok();

    let (existing, new) = match (existing, new) {
        (Some(existing), Some(new)) => (existing, new),
        (None, Some(_)) => return JsonMatch::ExistingInvalid,
        (Some(_), None) => return JsonMatch::NewInvalid,
        (None, None) => return JsonMatch::BothInvalid,
    };

    let Err(explanation) =
        assert_json_matches_no_panic(&new, &existing, Config::new(CompareMode::Strict))
    else {
        return JsonMatch::Full;
    };

    if assert_json_matches_no_panic(&new, &existing, Config::new(CompareMode::Inclusive)).is_ok() {
        JsonMatch::Superset(explanation)
    } else {
        JsonMatch::NoMatch(explanation)
    }
}

/// Compares two HTTP dumps whose bodies are JSON: header lines with the
/// character diff, bodies structurally.
#[must_use]
pub fn compare_http_json(existing: &str, new: &str, config: &AbideConfig) -> String {
    let mut existing = HttpMessage::parse(existing);
    let mut new = HttpMessage::parse(new);
    existing.apply_header_defaults(config);
    new.apply_header_defaults(config);
    // A body that is not JSON is classified by the structural comparison
    // below, so normalisation failures are left to it.
    let _ = existing.normalize_json_body(&config.defaults);
    let _ = new.normalize_json_body(&config.defaults);

    let mut diff = char_diff(&existing.header_dump(), &new.header_dump());

    let annotation = match compare_json(existing.body(), new.body()) {
        JsonMatch::Full => return diff,
        JsonMatch::Superset(_) if config.allow_json_superset => return diff,
        JsonMatch::Superset(explanation) | JsonMatch::NoMatch(explanation) => explanation,
        JsonMatch::ExistingInvalid => "ERROR: Existing body is not valid JSON".to_string(),
        JsonMatch::NewInvalid => "ERROR: New body is not valid JSON".to_string(),
        JsonMatch::BothInvalid => {
            if existing.body().is_empty() && new.body().is_empty() {
                return diff;
            }
            format!(
                "ERROR: Neither Existing nor New bodies are valid JSON\n{}\n{}",
                existing.dump(),
                new.dump()
            )
        }
    };

    diff.push('\n');
    diff.push_str(&annotation);
    diff
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id() -> SnapshotId {
        SnapshotId::parse("compare").expect("valid id")
    }

    #[test]
    fn identical_text_has_no_diff() {
        let config = AbideConfig::default();
        assert_eq!(
            compare(&id(), "hello", "hello", SnapshotFormat::Generic, &config),
            ""
        );
    }

    #[test]
    fn char_diff_marks_changes() {
        let diff = char_diff("hello world", "hello there");
        assert!(diff.starts_with("hello "));
        assert!(diff.contains(INSERT_STYLE));
        assert!(diff.contains(DELETE_STYLE));
    }

    #[test]
    fn unified_diff_when_configured() {
        let config = AbideConfig {
            unified_diff: true,
            ..AbideConfig::default()
        };
        let diff = compare(&id(), "a\nb\nc\n", "a\nB\nc\n", SnapshotFormat::Generic, &config);
        assert!(diff.contains("--- existing"));
        assert!(diff.contains("+++ new"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
    }

    #[test]
    fn json_classification() {
        assert_eq!(compare_json(r#"{"a":1}"#, r#"{ "a": 1 }"#), JsonMatch::Full);
        assert!(matches!(
            compare_json(r#"{"a":1}"#, r#"{"a":1,"b":2}"#),
            JsonMatch::Superset(_)
        ));
        assert!(matches!(
            compare_json(r#"{"a":1,"b":2}"#, r#"{"a":1,"b":3}"#),
            JsonMatch::NoMatch(_)
        ));
        assert_eq!(compare_json("nope", "{}"), JsonMatch::ExistingInvalid);
        assert_eq!(compare_json("{}", "nope"), JsonMatch::NewInvalid);
        assert_eq!(compare_json("", ""), JsonMatch::BothInvalid);
    }

    #[test]
    fn json_field_change_is_explained() {
        let config = AbideConfig::default();
        let existing = "HTTP/1.1 200 OK\nContent-Type: application/json\n\n{\"a\":1,\"b\":2}";
        let new = "HTTP/1.1 200 OK\nContent-Type: application/json\n\n{\"a\":1,\"b\":3}";
        let diff = compare_http_json(existing, new, &config);
        assert!(diff.contains(".b"), "diff should name the field: {diff}");
    }

    #[test]
    fn empty_bodies_on_both_sides_match() {
        let config = AbideConfig::default();
        let dump = "HTTP/1.1 204 No Content\nContent-Type: application/json\n\n";
        assert_eq!(compare_http_json(dump, dump, &config), "");
    }

    #[test]
    fn invalid_bodies_are_annotated() {
        let config = AbideConfig::default();
        let diff = compare_http_json("GET / HTTP/1.1\n\n<a>", "GET / HTTP/1.1\n\n<b>", &config);
        assert!(diff.contains("ERROR: Neither Existing nor New bodies are valid JSON"));
        assert!(diff.contains("<a>") && diff.contains("<b>"));

        let diff = compare_http_json("GET / HTTP/1.1\n\n{}", "GET / HTTP/1.1\n\n<b>", &config);
        assert!(diff.ends_with("ERROR: New body is not valid JSON"));
    }

    #[test]
    fn superset_policy_follows_config() {
        let existing = "HTTP/1.1 200 OK\n\n{\"a\":1}";
        let new = "HTTP/1.1 200 OK\n\n{\"a\":1,\"extra\":true}";

        assert_eq!(compare_http_json(existing, new, &AbideConfig::default()), "");

        let strict = AbideConfig {
            allow_json_superset: false,
            ..AbideConfig::default()
        };
        assert!(!compare_http_json(existing, new, &strict).is_empty());
    }

    #[test]
    fn defaults_neutralise_volatile_fields() {
        let mut config = AbideConfig::default();
        config.defaults.insert("Date".to_string(), json!("<date>"));
        config.defaults.insert("id".to_string(), json!(0));

        let existing = "HTTP/1.1 200 OK\nDate: yesterday\n\n{\"id\":1,\"name\":\"a\"}";
        let new = "HTTP/1.1 200 OK\nDate: today\n\n{\"id\":2,\"name\":\"a\"}";
        assert_eq!(compare_http_json(existing, new, &config), "");
    }

    #[test]
    fn header_changes_are_reported() {
        let config = AbideConfig::default();
        let existing = "HTTP/1.1 200 OK\n\n{}";
        let new = "HTTP/1.1 201 Created\n\n{}";
        assert!(!compare_http_json(existing, new, &config).is_empty());
    }
}
