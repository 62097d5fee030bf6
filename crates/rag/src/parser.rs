use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EmojiError, Result};
use crate::pipeline::EmojiSelection;

static TRAILING_OBJECT_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static TRAILING_ARRAY_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());

/// Extracts the structured selection from raw model text: the span between
/// the first `{` and the last `}` is parsed as JSON; on failure a single
/// trailing-comma repair pass is applied and the parse retried once. Both
/// fields must be present.
pub fn extract_selection(raw: &str) -> Result<EmojiSelection> {
    let start = raw
        .find('{')
        .ok_or_else(|| EmojiError::MalformedOutput("no JSON object in output".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| EmojiError::MalformedOutput("no JSON object in output".to_string()))?;
    if end < start {
        return Err(EmojiError::MalformedOutput(
            "no JSON object in output".to_string(),
        ));
    }
    let span = &raw[start..=end];
    match serde_json::from_str::<EmojiSelection>(span) {
        Ok(selection) => Ok(selection),
        Err(first_err) => {
            let repaired = repair_json(span);
            serde_json::from_str::<EmojiSelection>(&repaired)
                .map_err(|_| EmojiError::MalformedOutput(first_err.to_string()))
        }
    }
}

/// Strips commas that immediately precede a closing brace or bracket, the
/// one malformation the upstream models actually produce.
fn repair_json(json_str: &str) -> String {
    let fixed = TRAILING_OBJECT_COMMA.replace_all(json_str, "}");
    TRAILING_ARRAY_COMMA.replace_all(&fixed, "]").into_owned()
}
