//! Reference normalization: model first, local parser as the safety net.

use std::sync::Arc;

use crate::clients::ChatRequest;
use crate::error::{InsightError, Result};
use crate::gateway::InferenceGateway;
use crate::reference::{Reference, parse_reference};
use crate::repair::strip_code_fences;

const NORMALIZE_SYSTEM_PROMPT: &str = "You normalize Bible references. \
Reply with only the reference in the form 'Book Chapter:Verse' (or 'Book Chapter:Verse-Verse' for ranges), \
using the full English book name, for example 'John 3:16' or '1 Corinthians 13:4-7'. \
Do not add commentary, quotes, or the verse text.";

/// Where the canonical reference came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationSource {
    /// Input was already canonical
    Unchanged,
    Model,
    LocalParser,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub reference: Reference,
    pub source: NormalizationSource,
}

pub struct ReferenceNormalizer {
    gateway: Option<Arc<InferenceGateway>>,
    max_tokens: u32,
}

impl ReferenceNormalizer {
    /// Normalizer that asks the model before falling back to the local parser.
    pub fn with_model(gateway: Arc<InferenceGateway>, max_tokens: u32) -> Self {
        Self {
            gateway: Some(gateway),
            max_tokens,
        }
    }

    /// Normalizer that never consults the model.
    pub fn local_only() -> Self {
        Self {
            gateway: None,
            max_tokens: 0,
        }
    }

    pub async fn normalize(&self, raw: &str) -> Result<Normalized> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(InsightError::validation("reference must not be empty"));
        }

        let local = parse_reference(input);
        if let Some(reference) = &local
            && reference.canonical() == input
        {
            return Ok(Normalized {
                reference: reference.clone(),
                source: NormalizationSource::Unchanged,
            });
        }

        if let Some(gateway) = &self.gateway {
            match self.ask_model(gateway, input).await {
                Ok(reply) => {
                    if let Some(reference) = resolve_model_reply(input, &reply) {
                        return Ok(Normalized {
                            reference,
                            source: NormalizationSource::Model,
                        });
                    }
                    tracing::debug!(
                        "Model reply '{}' for '{}' unusable, falling back to local parser",
                        reply,
                        input
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Model normalization failed for '{}': {}; using local parser",
                        input,
                        e
                    );
                }
            }
        }

        local
            .map(|reference| Normalized {
                reference,
                source: NormalizationSource::LocalParser,
            })
            .ok_or_else(|| InsightError::Normalization {
                input: raw.to_string(),
            })
    }

    async fn ask_model(&self, gateway: &InferenceGateway, input: &str) -> Result<String> {
        let request = ChatRequest::new("normalize", NORMALIZE_SYSTEM_PROMPT, input)
            .with_max_tokens(self.max_tokens);
        let raw = gateway.complete(&request).await?;
        Ok(clean_model_reply(&raw))
    }
}

/// Reduce a model reply to the bare reference text.
fn clean_model_reply(raw: &str) -> String {
    strip_code_fences(raw)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.'))
        .trim()
        .to_string()
}

/// Apply the tie-break rules to a cleaned model reply.
///
/// An echo of the input (case-insensitive, after the same cleaning as the
/// reply) is never trusted; the local parse of the input takes precedence.
fn resolve_model_reply(input: &str, reply: &str) -> Option<Reference> {
    if reply.is_empty() || reply.eq_ignore_ascii_case(&clean_model_reply(input)) {
        return None;
    }
    parse_reference(reply)
}
