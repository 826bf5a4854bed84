use autoergen_core::{ErSpec, Relationship};

use crate::ParseError;

const FENCE: &str = "```";

/// Strip one markdown code fence and its language tag, if present.
///
/// Keeps the text between the first fence and the next one (or the end of
/// input when the fence is never closed). A single word alone on the opening
/// fence line is a language tag, e.g. `dot` or `json`; so is a known tag
/// followed by content on that line. A body that is only one word is kept.
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(open) = text.find(FENCE) else {
        return text;
    };
    let after_open = &text[open + FENCE.len()..];
    let body = match after_open.find(FENCE) {
        Some(close) => &after_open[..close],
        None => after_open,
    };

    let body = match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first.trim_end()) => rest,
        _ => strip_inline_tag(body),
    };
    body.trim()
}

/// Tags a model writes on the same line as the content, e.g. "```dot digraph {".
const INLINE_TAGS: [&str; 4] = ["dot", "gv", "graphviz", "json"];

/// Words that open a DOT graph and so are content, never a tag.
const DOT_KEYWORDS: [&str; 3] = ["digraph", "graph", "strict"];

fn is_language_tag(s: &str) -> bool {
    !DOT_KEYWORDS.contains(&s.to_ascii_lowercase().as_str())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

fn strip_inline_tag(body: &str) -> &str {
    let text = body.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((tag, rest)) if INLINE_TAGS.contains(&tag.to_ascii_lowercase().as_str()) => rest,
        _ => body,
    }
}

/// Normalize markup-pipeline output. No syntax check is done here; a bad
/// description is reported by the render engine.
pub fn normalize_markup(raw: &str) -> String {
    strip_code_fence(raw).to_string()
}

#[derive(serde::Deserialize)]
struct RawErSpec {
    entities: Vec<String>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(serde::Deserialize)]
struct RawRelationship {
    from: String,
    to: String,
    #[serde(default)]
    relation: Option<String>,
}

impl From<RawErSpec> for ErSpec {
    fn from(raw: RawErSpec) -> Self {
        let relationships = raw
            .relationships
            .into_iter()
            .map(|r| Relationship::new(r.from, r.to, r.relation.unwrap_or_default()))
            .collect();
        ErSpec::new(raw.entities, relationships)
    }
}

/// Parse structured-pipeline output into an [`ErSpec`].
pub fn parse_er_spec(raw: &str) -> Result<ErSpec, ParseError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(ParseError::new("response is empty"));
    }

    let first_err = match serde_json::from_str::<RawErSpec>(text) {
        Ok(spec) => return Ok(spec.into()),
        Err(e) => e,
    };

    // Models sometimes wrap the object in prose; try the outermost braces.
    if let Some(object) = extract_json_object(text) {
        if object.len() < text.len() {
            if let Ok(spec) = serde_json::from_str::<RawErSpec>(object) {
                return Ok(spec.into());
            }
        }
    }

    Err(ParseError::new(first_err.to_string()))
}

/// Parse, or fall back to the empty specification so callers can still show
/// an (empty) diagram.
pub fn parse_er_spec_or_empty(raw: &str) -> (ErSpec, Option<ParseError>) {
    match parse_er_spec(raw) {
        Ok(spec) => (spec, None),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to empty ER specification");
            (ErSpec::default(), Some(e))
        }
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}
