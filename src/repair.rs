//! Repair-or-fail parsing of model output.
//!
//! Local models wrap JSON in markdown fences, add prose around it, or emit
//! JSON5-isms (single quotes, trailing commas, unquoted keys). Fallback order:
//!
//! 1. strict `serde_json` on the fence-stripped text
//! 2. tolerant `json5` on the same text
//! 3. the first balanced `{...}` object in the text, strict then `json5`
//! 4. `MalformedModelOutput`, which callers turn into a degraded payload

use crate::error::{InsightError, Result};
use serde_json::Value;

/// How the model output was decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Tolerant,
    Extracted,
}

/// Strip a single surrounding markdown code fence (with optional language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "json5", ...) on the opening line
    let body = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest,
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

/// Decode model output into a JSON value, recording which fallback succeeded.
pub fn parse_model_json(raw: &str) -> Result<(Value, ParseMode)> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(malformed("model returned an empty response", raw));
    }

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Ok((v, ParseMode::Strict));
    }
    if let Ok(v) = json5::from_str::<Value>(text) {
        tracing::debug!("Model output needed tolerant JSON5 parsing");
        return Ok((v, ParseMode::Tolerant));
    }

    if let Some(candidate) = first_balanced_object(text) {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            return Ok((v, ParseMode::Extracted));
        }
        match json5::from_str::<Value>(candidate) {
            Ok(v) => return Ok((v, ParseMode::Extracted)),
            Err(e) => {
                return Err(malformed(
                    format!("model returned invalid JSON: {}", e),
                    raw,
                ));
            }
        }
    }

    Err(malformed("model did not return a JSON object", raw))
}

fn malformed(message: impl Into<String>, raw: &str) -> InsightError {
    InsightError::MalformedModelOutput {
        message: message.into(),
        raw_output: raw.to_string(),
    }
}

/// Find the first complete `{...}` object, balancing braces outside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: i64 = 0;
    let mut in_string: Option<char> = None;
    let mut escape = false;

    for (idx, ch) in text.char_indices().skip_while(|(i, _)| *i < start) {
        if let Some(quote) = in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}
