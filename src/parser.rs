use crate::error::MetadataError;
use crate::extractor::{self, MetadataResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Caller-supplied generation settings that extracted metadata is merged over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationDefaults {
    #[serde(default)]
    pub positive_prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub seed: i128,
    #[serde(default)]
    pub steps: i128,
    #[serde(default)]
    pub cfg: f64,
}

impl GenerationDefaults {
    /// Overwrites a default only where the extracted field is non-empty / present.
    pub fn merged_with(mut self, meta: &MetadataResult) -> Self {
        if !meta.positive.is_empty() {
            self.positive_prompt = meta.positive.clone();
        }
        if !meta.negative.is_empty() {
            self.negative_prompt = meta.negative.clone();
        }
        if let Some(seed) = meta.seed {
            self.seed = seed;
        }
        if let Some(steps) = meta.steps {
            self.steps = steps;
        }
        if let Some(cfg) = meta.cfg {
            self.cfg = cfg;
        }
        self
    }
}

/// Rewrites bare `NaN` values (`"cfg": NaN`) to `null`.
///
/// Some producers write non-standard JSON; only occurrences that follow a colon
/// (with optional whitespace) are touched.
pub fn normalize_nan(raw: &str) -> Cow<'_, str> {
    if !raw.contains("NaN") {
        return Cow::Borrowed(raw);
    }

    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find("NaN") {
        output.push_str(&rest[..idx]);
        let follows_colon = output.trim_end().ends_with(':');
        output.push_str(if follows_colon { "null" } else { "NaN" });
        rest = &rest[idx + "NaN".len()..];
    }
    output.push_str(rest);
    Cow::Owned(output)
}

/// Parses an embedded prompt blob into a workflow graph value.
///
/// This is the only fallible step of metadata recovery.
pub fn parse_workflow(raw: &str) -> Result<Value, MetadataError> {
    let normalized = normalize_nan(raw);
    Ok(serde_json::from_str(&normalized)?)
}

/// Parses a prompt blob and runs the extractor over it.
pub fn extract_from_prompt_text(raw: &str) -> Result<MetadataResult, MetadataError> {
    let workflow = parse_workflow(raw)?;
    Ok(extractor::extract_from_workflow(&workflow))
}

/// Resolves the final generation settings for an image.
///
/// Any failure leaves `defaults` untouched; it is logged, never surfaced.
pub fn resolve_generation(raw: Option<&str>, defaults: GenerationDefaults) -> GenerationDefaults {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return defaults;
    };

    match extract_from_prompt_text(raw) {
        Ok(meta) => defaults.merged_with(&meta),
        Err(error) => {
            log::debug!("Ignoring unreadable prompt metadata: {}", error);
            defaults
        }
    }
}
