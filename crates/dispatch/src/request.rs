//! Dispatch request intake: raw form fields in, validated request out.
//!
//! Validation rule: credential and target list are always required, and at
//! least one of `message` / `message_variants` must carry text. When both
//! are present the variants win.

use outreach_core::config::AppConfig;
use outreach_core::types::{MessageSource, TargetAccount};
use outreach_core::{OutreachError, OutreachResult};
use serde::{Deserialize, Serialize};

/// Hard ceiling on targets per run, regardless of configuration.
pub const MAX_TARGETS: usize = 50;

const VARIANT_LABELS: [&str; 3] = ["variation", "variación", "variacion"];

/// Raw dispatch request as submitted by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchInput {
    pub credential: String,
    /// Newline-delimited handles.
    pub targets: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Newline-delimited variants, optionally labelled "Variation N:".
    #[serde(default)]
    pub message_variants: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// A request that passed validation. Only [`DispatchRequest::parse`] builds one.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    credential: String,
    targets: Vec<TargetAccount>,
    source: MessageSource,
    context: Option<String>,
}

impl DispatchRequest {
    pub fn parse(input: &DispatchInput, config: &AppConfig) -> OutreachResult<Self> {
        let credential = input.credential.trim();
        if credential.is_empty() || input.targets.trim().is_empty() {
            return Err(missing_fields());
        }

        let targets = parse_targets(&input.targets);
        check_target_count(targets.len(), config)?;

        let marker = config.personalization.marker.as_str();
        let variants: Vec<String> = input
            .message_variants
            .as_deref()
            .map(parse_variants)
            .unwrap_or_default()
            .into_iter()
            .filter(|v| has_content(v, marker))
            .collect();

        let source = if !variants.is_empty() {
            MessageSource::Variants(variants)
        } else {
            match input.message.as_deref().map(str::trim) {
                Some(text) if has_content(text, marker) => MessageSource::Single(text.to_string()),
                _ => return Err(missing_message()),
            }
        };

        let context = input
            .context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            credential: credential.to_string(),
            targets,
            source,
            context,
        })
    }

    /// Re-check the bounds against `config`, which may be stricter than the
    /// one the request was parsed with.
    pub fn check(&self, config: &AppConfig) -> OutreachResult<()> {
        if self.credential.is_empty() {
            return Err(missing_fields());
        }
        check_target_count(self.targets.len(), config)?;
        if self.source.is_empty() {
            return Err(missing_message());
        }
        Ok(())
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn targets(&self) -> &[TargetAccount] {
        &self.targets
    }

    pub fn source(&self) -> &MessageSource {
        &self.source
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

fn check_target_count(count: usize, config: &AppConfig) -> OutreachResult<()> {
    let max_targets = config.dispatch.max_targets.clamp(1, MAX_TARGETS);
    if count == 0 || count > max_targets {
        return Err(OutreachError::Validation(format!(
            "Debes ingresar entre 1 y {} cuentas válidas",
            max_targets
        )));
    }
    Ok(())
}

fn missing_fields() -> OutreachError {
    OutreachError::Validation("SessionID y lista de usuarios son requeridos".to_string())
}

fn missing_message() -> OutreachError {
    OutreachError::Validation("Debes ingresar un mensaje o variaciones".to_string())
}

/// Split newline-delimited handles and normalize each, dropping invalid lines.
pub fn parse_targets(raw: &str) -> Vec<TargetAccount> {
    raw.lines()
        .filter_map(|line| {
            let target = TargetAccount::normalize(line);
            if target.is_none() && !line.trim().is_empty() {
                tracing::debug!(line = %line.trim(), "Skipping invalid target handle");
            }
            target
        })
        .collect()
}

/// Split newline-delimited variants, stripping "Variation N:" labels.
pub fn parse_variants(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| strip_variant_label(line.trim()).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_variant_label(line: &str) -> &str {
    for label in VARIANT_LABELS {
        let Some(prefix) = line.get(..label.len()) else {
            continue;
        };
        if prefix.to_lowercase() != label {
            continue;
        }
        let rest = line[label.len()..].trim_start();
        let after_digits = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        if after_digits.len() == rest.len() {
            continue;
        }
        if let Some(body) = after_digits.trim_start().strip_prefix(':') {
            return body;
        }
    }
    line
}

fn has_content(text: &str, marker: &str) -> bool {
    let stripped = if marker.is_empty() {
        text.to_string()
    } else {
        text.replace(marker, "")
    };
    !stripped.trim().is_empty()
}
