//! Contextual insight generation.
//!
//! Builds one prompt per request, runs it through the [`InferenceGateway`],
//! and repairs whatever the model returns into an [`InsightResult`]. Model
//! output that cannot be decoded at all becomes a degraded outcome carrying
//! the raw text; it never fails the request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::InsightCache;
use crate::clients::ChatRequest;
use crate::config::{Config, InsightsConfig};
use crate::error::{InsightError, Result};
use crate::gateway::InferenceGateway;
use crate::normalizer::ReferenceNormalizer;
use crate::repair::{ParseMode, parse_model_json};

const MAX_TRANSLATION_CHARS: usize = 32;

const INSIGHT_SYSTEM_PROMPT: &str = "You are a careful biblical studies assistant. \
Respond with a single JSON object and nothing else: no markdown fences, no commentary. \
Use exactly these keys:\n\
- \"summary\": string, a concise explanation of the passage or topic\n\
- \"theological_terms\": object mapping each key theological term to a short explanation\n\
- \"cross_references\": array of related references, each formatted \"Book Chapter:Verse\"\n\
- \"historical_context\": string describing the historical and cultural setting\n\
- \"original_language_notes\": array of strings about relevant Hebrew, Aramaic or Greek words\n\
- \"related_entities\": object with \"people\" and \"places\" arrays of names";

/// What the caller wants insights about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Verse,
    Topic,
    TextSnippet,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Verse => "verse",
            InsightKind::Topic => "topic",
            InsightKind::TextSnippet => "text_snippet",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightKind {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "verse" => Ok(InsightKind::Verse),
            "topic" => Ok(InsightKind::Topic),
            "text_snippet" | "snippet" | "text" => Ok(InsightKind::TextSnippet),
            other => Err(InsightError::validation(format!(
                "invalid type '{}': expected verse, topic or text_snippet",
                other
            ))),
        }
    }
}

/// A validated request. For verses `reference_or_text` is the canonical reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightRequest {
    pub kind: InsightKind,
    pub reference_or_text: String,
    pub translation: String,
}

/// People and places named by the model; each list holds distinct names in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntities {
    pub people: Vec<String>,
    pub places: Vec<String>,
}

/// Structured commentary for a reference, topic or snippet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub summary: String,
    /// Always a mapping; list-shaped model output is replaced by an empty map
    pub theological_terms: BTreeMap<String, String>,
    pub cross_references: Vec<String>,
    pub historical_context: String,
    pub original_language_notes: Vec<String>,
    pub related_entities: RelatedEntities,
}

/// Either a repaired result or the degraded `{error, raw_output}` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsightOutcome {
    Insights(InsightResult),
    Degraded { error: String, raw_output: String },
}

impl InsightOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, InsightOutcome::Degraded { .. })
    }

    pub fn insights(&self) -> Option<&InsightResult> {
        match self {
            InsightOutcome::Insights(result) => Some(result),
            InsightOutcome::Degraded { .. } => None,
        }
    }
}

impl InsightResult {
    /// Coerce decoded model JSON into a result.
    ///
    /// Well-formed string and string-list fields pass through verbatim; only
    /// malformed shapes are coerced. Returns the corrections applied so
    /// callers can log them. Only a non-object top level is rejected.
    pub fn from_model_value(value: Value) -> Result<(Self, Vec<String>)> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(InsightError::MalformedModelOutput {
                    message: "model output is not a JSON object".to_string(),
                    raw_output: other.to_string(),
                });
            }
        };
        // Some models wrap everything in {"insights": {...}}
        if obj.len() == 1
            && matches!(obj.get("insights"), Some(Value::Object(_)))
            && let Some(Value::Object(inner)) = obj.remove("insights")
        {
            obj = inner;
        }

        let mut corrections = Vec::new();
        let theological_terms = coerce_terms(obj.remove("theological_terms"), &mut corrections);
        let related_entities = coerce_entities(obj.remove("related_entities"), &mut corrections);

        let result = InsightResult {
            summary: text_field(obj.remove("summary")),
            theological_terms,
            cross_references: list_field(obj.remove("cross_references")),
            historical_context: text_field(obj.remove("historical_context")),
            original_language_notes: list_field(obj.remove("original_language_notes")),
            related_entities,
        };
        Ok((result, corrections))
    }
}

fn coerce_terms(value: Option<Value>, corrections: &mut Vec<String>) -> BTreeMap<String, String> {
    match value {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(term, explanation)| {
                let explanation = match explanation {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (term, explanation)
            })
            .collect(),
        Some(Value::Array(items)) => {
            corrections.push(format!(
                "theological_terms was a list of {} items; replaced with an empty mapping",
                items.len()
            ));
            BTreeMap::new()
        }
        Some(other) => {
            corrections.push(format!(
                "theological_terms was {}; replaced with an empty mapping",
                json_type(&other)
            ));
            BTreeMap::new()
        }
    }
}

fn coerce_entities(value: Option<Value>, corrections: &mut Vec<String>) -> RelatedEntities {
    match value {
        None | Some(Value::Null) => RelatedEntities::default(),
        Some(Value::Object(mut map)) => RelatedEntities {
            people: distinct(list_field(map.remove("people"))),
            places: distinct(list_field(map.remove("places"))),
        },
        Some(other) => {
            corrections.push(format!(
                "related_entities was {}; replaced with empty people and places",
                json_type(&other)
            ));
            RelatedEntities::default()
        }
    }
}

fn text_field(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Some(other) => other.to_string(),
    }
}

fn list_field(value: Option<Value>) -> Vec<String> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    // Strings are kept as sent; other item shapes are salvaged or dropped
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(map) => string_in(&map, &["reference", "ref", "name", "text", "note"]),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn distinct(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn string_in(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Kind-specific user prompt
pub fn compose_prompt(request: &InsightRequest) -> String {
    match request.kind {
        InsightKind::Verse => format!(
            "Provide contextual insights for {} ({} translation). \
Explain its meaning in context, the key theological terms, related passages, \
the historical setting, and notable original-language words.",
            request.reference_or_text, request.translation
        ),
        InsightKind::Topic => format!(
            "Provide contextual insights on the biblical topic \"{}\", citing passages from the {} translation. \
Summarize how Scripture treats the topic, define the key theological terms, \
list the most relevant passages, and note the historical and original-language background.",
            request.reference_or_text, request.translation
        ),
        InsightKind::TextSnippet => format!(
            "Provide contextual insights for the following passage ({} translation). \
Identify where it comes from if you can, explain its meaning, key theological terms, \
related passages, historical setting and original-language notes.\n\nPassage:\n{}",
            request.translation, request.reference_or_text
        ),
    }
}

/// Turn raw model text into an outcome. Never fails.
pub fn interpret_model_output(raw: &str) -> InsightOutcome {
    let decoded = parse_model_json(raw).and_then(|(value, mode)| {
        if mode != ParseMode::Strict {
            tracing::warn!("Model output required repair ({:?} parse)", mode);
        }
        InsightResult::from_model_value(value)
    });

    match decoded {
        Ok((result, corrections)) => {
            for correction in &corrections {
                tracing::warn!("Corrected model output: {}", correction);
            }
            InsightOutcome::Insights(result)
        }
        Err(e) => {
            tracing::warn!("Returning degraded insight result: {}", e);
            let error = match &e {
                InsightError::MalformedModelOutput { message, .. } => {
                    format!("Failed to parse model output: {}", message)
                }
                other => other.to_string(),
            };
            InsightOutcome::Degraded {
                error,
                raw_output: raw.to_string(),
            }
        }
    }
}

/// A request after validation, with the text the caller originally sent
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: InsightRequest,
    pub original_input: String,
}

pub struct InsightAggregator {
    gateway: Arc<InferenceGateway>,
    normalizer: ReferenceNormalizer,
    cache: Option<InsightCache>,
    default_translation: String,
    max_input_chars: usize,
}

impl InsightAggregator {
    pub fn new(
        gateway: Arc<InferenceGateway>,
        normalizer: ReferenceNormalizer,
        settings: &InsightsConfig,
    ) -> Self {
        Self {
            gateway,
            normalizer,
            cache: InsightCache::new(Duration::from_secs(settings.cache_ttl_sec), settings.cache_max),
            default_translation: settings.default_translation.clone(),
            max_input_chars: settings.max_input_chars,
        }
    }

    /// Wire up gateway, normalizer and cache from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = Arc::new(InferenceGateway::from_config(config)?);
        let normalizer = if config.insights.llm_reference_normalization {
            ReferenceNormalizer::with_model(gateway.clone(), config.llm.normalize_max_tokens)
        } else {
            ReferenceNormalizer::local_only()
        };
        Ok(Self::new(gateway, normalizer, &config.insights))
    }

    pub fn gateway(&self) -> &Arc<InferenceGateway> {
        &self.gateway
    }

    pub fn default_translation(&self) -> &str {
        &self.default_translation
    }

    /// Validate raw input and normalize verse references.
    pub async fn prepare(
        &self,
        kind: InsightKind,
        input: &str,
        translation: Option<&str>,
    ) -> Result<PreparedRequest> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(InsightError::validation(match kind {
                InsightKind::Verse => "reference is required for type 'verse'",
                InsightKind::Topic => "topic is required for type 'topic'",
                InsightKind::TextSnippet => "text is required for type 'text_snippet'",
            }));
        }
        let chars = trimmed.chars().count();
        if chars > self.max_input_chars {
            return Err(InsightError::validation(format!(
                "input is {} characters; the limit is {}",
                chars, self.max_input_chars
            )));
        }

        let translation = match translation.map(str::trim) {
            None | Some("") => self.default_translation.clone(),
            Some(t) => {
                if t.chars().count() > MAX_TRANSLATION_CHARS
                    || !t.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '-')
                {
                    return Err(InsightError::validation(format!(
                        "invalid translation '{}'",
                        t
                    )));
                }
                t.to_string()
            }
        };

        let reference_or_text = match kind {
            InsightKind::Verse => {
                let normalized = self.normalizer.normalize(trimmed).await?;
                tracing::debug!(
                    "Normalized '{}' to '{}' via {:?}",
                    trimmed,
                    normalized.reference,
                    normalized.source
                );
                normalized.reference.canonical()
            }
            InsightKind::Topic | InsightKind::TextSnippet => trimmed.to_string(),
        };

        Ok(PreparedRequest {
            request: InsightRequest {
                kind,
                reference_or_text,
                translation,
            },
            original_input: trimmed.to_string(),
        })
    }

    /// Generate insights for a validated request.
    ///
    /// Network failures surface as `UpstreamUnavailable`; undecodable model
    /// output comes back as [`InsightOutcome::Degraded`].
    pub async fn generate(&self, request: &InsightRequest) -> Result<InsightOutcome> {
        let cache_key =
            InsightCache::key(request.kind, &request.reference_or_text, &request.translation);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&cache_key).await
        {
            tracing::debug!("Insight cache hit for {}", cache_key);
            return Ok(InsightOutcome::Insights(hit));
        }

        let chat = ChatRequest::new("insight", INSIGHT_SYSTEM_PROMPT, compose_prompt(request));
        let raw = self.gateway.complete(&chat).await?;
        let outcome = interpret_model_output(&raw);

        if let (Some(cache), InsightOutcome::Insights(result)) = (&self.cache, &outcome) {
            cache.put(cache_key, result.clone()).await;
        }
        Ok(outcome)
    }

    /// Validate, normalize and generate in one step.
    pub async fn insights_for(
        &self,
        kind: InsightKind,
        input: &str,
        translation: Option<&str>,
    ) -> Result<(PreparedRequest, InsightOutcome)> {
        let prepared = self.prepare(kind, input, translation).await?;
        let outcome = self.generate(&prepared.request).await?;
        Ok((prepared, outcome))
    }
}
