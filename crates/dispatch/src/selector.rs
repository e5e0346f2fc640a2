//! Message selection and personalization.
//!
//! Picks a variant, fills `{{target}}`, `{{sender}}` and `{{topic}}`, and
//! optionally hands marked templates to a text generator. Selection never
//! fails: generator errors fall back to the substituted template.

use outreach_core::config::PersonalizationConfig;
use outreach_core::services::TextGenerator;
use outreach_core::types::{MessageSource, TargetAccount};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

const TARGET_PLACEHOLDER: &str = "{{target}}";
const SENDER_PLACEHOLDER: &str = "{{sender}}";
const TOPIC_PLACEHOLDER: &str = "{{topic}}";

pub struct MessageSelector {
    generator: Option<Arc<dyn TextGenerator>>,
    marker: String,
    prompt_max_chars: usize,
    default_topic: String,
    max_chars: usize,
}

impl MessageSelector {
    pub fn new(config: &PersonalizationConfig, max_chars: usize) -> Self {
        Self {
            generator: None,
            marker: config.marker.clone(),
            prompt_max_chars: config.prompt_max_chars,
            default_topic: config.default_topic.clone(),
            max_chars,
        }
    }

    /// Attach a text generator for templates carrying the marker.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Produce the final text for one target.
    pub async fn select<R: Rng + ?Sized>(
        &self,
        source: &MessageSource,
        target: &TargetAccount,
        sender: &str,
        context: Option<&str>,
        rng: &mut R,
    ) -> String {
        let template = pick_variant(source, rng).unwrap_or_default();
        // Only the template can request generation, not the filled-in values.
        let generate = self.wants_generation(template);
        let substituted = self.substitute(template, target, sender, context);

        let text = if generate {
            self.personalize(&substituted, target, context).await
        } else {
            substituted
        };

        truncate_chars(&text, self.max_chars)
    }

    /// Fill placeholders, using the default topic when context is absent.
    pub fn substitute(
        &self,
        template: &str,
        target: &TargetAccount,
        sender: &str,
        context: Option<&str>,
    ) -> String {
        let topic = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_topic);
        template
            .replace(TARGET_PLACEHOLDER, target.as_str())
            .replace(SENDER_PLACEHOLDER, sender)
            .replace(TOPIC_PLACEHOLDER, topic)
    }

    pub fn strip_marker(&self, text: &str) -> String {
        if self.marker.is_empty() {
            return text.trim().to_string();
        }
        let stripped = text.replace(&self.marker, "");
        collapse_spaces(stripped.trim())
    }

    fn wants_generation(&self, text: &str) -> bool {
        !self.marker.is_empty() && text.contains(&self.marker)
    }

    async fn personalize(&self, text: &str, target: &TargetAccount, context: Option<&str>) -> String {
        let fallback = self.strip_marker(text);
        let Some(generator) = &self.generator else {
            return fallback;
        };

        let prompt = self.build_prompt(&fallback, target, context);
        match generator.generate(&prompt).await {
            Ok(generated) => {
                let generated = self.strip_marker(&generated);
                if generated.is_empty() {
                    warn!(target = %target, "Generator returned empty text, using template");
                    fallback
                } else {
                    debug!(target = %target, chars = generated.chars().count(), "Message personalized");
                    generated
                }
            }
            Err(err) => {
                warn!(
                    target = %target,
                    kind = err.kind.as_str(),
                    error = %err.message,
                    "Personalization failed, using template"
                );
                fallback
            }
        }
    }

    fn build_prompt(&self, text: &str, target: &TargetAccount, context: Option<&str>) -> String {
        let topic = context.unwrap_or(&self.default_topic);
        let prompt = format!(
            "Reescribe este mensaje directo para @{} de forma natural y breve, sin cambiar su intención. Tema: {}. Mensaje: {}",
            target, topic, text
        );
        truncate_chars(&prompt, self.prompt_max_chars)
    }
}

/// Uniform choice among non-empty variants.
pub fn pick_variant<'a, R: Rng + ?Sized>(source: &'a MessageSource, rng: &mut R) -> Option<&'a str> {
    match source {
        MessageSource::Single(text) => Some(text.as_str()),
        MessageSource::Variants(variants) => {
            let candidates: Vec<&str> = variants
                .iter()
                .map(|v| v.as_str())
                .filter(|v| !v.trim().is_empty())
                .collect();
            candidates.choose(rng).copied()
        }
    }
}

/// Cap `text` at `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !previous_space {
                out.push(c);
            }
            previous_space = true;
        } else {
            out.push(c);
            previous_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outreach_core::ServiceError;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, ServiceError>,
    }

    impl EchoGenerator {
        fn new(reply: Result<String, ServiceError>) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn selector() -> MessageSelector {
        MessageSelector::new(&PersonalizationConfig::default(), 1000)
    }

    fn target(handle: &str) -> TargetAccount {
        TargetAccount::normalize(handle).unwrap()
    }

    #[tokio::test]
    async fn test_single_message_passthrough() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = selector()
            .select(&MessageSource::Single("Hola!".into()), &target("ana"), "me", None, &mut rng)
            .await;
        assert_eq!(text, "Hola!");
    }

    #[tokio::test]
    async fn test_variants_chosen_among_non_empty() {
        let source = MessageSource::Variants(vec!["uno".into(), "  ".into(), "dos".into(), "tres".into()]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let text = selector().select(&source, &target("ana"), "me", None, &mut rng).await;
            seen.insert(text);
        }
        let expected: HashSet<String> = ["uno", "dos", "tres"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_substitution_with_and_without_context() {
        let s = selector();
        let tpl = "Hola @{{target}}, soy {{sender}}. Me encantó {{topic}}.";
        assert_eq!(
            s.substitute(tpl, &target("ana"), "beto", Some("tu último post")),
            "Hola @ana, soy beto. Me encantó tu último post."
        );
        assert_eq!(
            s.substitute(tpl, &target("ana"), "beto", None),
            "Hola @ana, soy beto. Me encantó tu contenido."
        );
        assert_eq!(
            s.substitute(tpl, &target("ana"), "beto", Some("   ")),
            "Hola @ana, soy beto. Me encantó tu contenido."
        );
    }

    #[tokio::test]
    async fn test_long_message_truncated() {
        let s = MessageSelector::new(&PersonalizationConfig::default(), 10);
        let mut rng = StdRng::seed_from_u64(1);
        let text = s
            .select(&MessageSource::Single("ñandú ñandú ñandú".into()), &target("a"), "b", None, &mut rng)
            .await;
        assert_eq!(text, "ñandú ñand");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[tokio::test]
    async fn test_marker_uses_generator() {
        let generator = Arc::new(EchoGenerator::new(Ok("Hola Ana, ¡gran foto!".into())));
        let s = selector().with_generator(generator.clone());
        let mut rng = StdRng::seed_from_u64(1);
        let text = s
            .select(
                &MessageSource::Single("[[ai]] Hola {{target}}".into()),
                &target("ana"),
                "me",
                Some("fotografía"),
                &mut rng,
            )
            .await;
        assert_eq!(text, "Hola Ana, ¡gran foto!");

        let prompts = generator.prompts.lock().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Hola ana"));
        assert!(prompts[0].contains("fotografía"));
        assert!(!prompts[0].contains("[[ai]]"));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let generator = Arc::new(EchoGenerator::new(Err(ServiceError::network("timeout"))));
        let s = selector().with_generator(generator);
        let mut rng = StdRng::seed_from_u64(1);
        let text = s
            .select(&MessageSource::Single("Hola {{target}} [[ai]]".into()), &target("ana"), "me", None, &mut rng)
            .await;
        assert_eq!(text, "Hola ana");
    }

    #[tokio::test]
    async fn test_generator_empty_output_falls_back() {
        let generator = Arc::new(EchoGenerator::new(Ok("  ".into())));
        let s = selector().with_generator(generator);
        let mut rng = StdRng::seed_from_u64(1);
        let text = s
            .select(&MessageSource::Single("[[ai]]Hola".into()), &target("ana"), "me", None, &mut rng)
            .await;
        assert_eq!(text, "Hola");
    }

    #[tokio::test]
    async fn test_marker_stripped_without_generator() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = selector()
            .select(&MessageSource::Single("Hola [[ai]] amigo".into()), &target("ana"), "me", None, &mut rng)
            .await;
        assert_eq!(text, "Hola amigo");
    }

    #[tokio::test]
    async fn test_marker_in_context_does_not_trigger_generator() {
        let generator = Arc::new(EchoGenerator::new(Ok("generated".into())));
        let s = selector().with_generator(generator.clone());
        let mut rng = StdRng::seed_from_u64(1);
        let text = s
            .select(
                &MessageSource::Single("Me gustó {{topic}}".into()),
                &target("ana"),
                "me",
                Some("tu post [[ai]]"),
                &mut rng,
            )
            .await;
        assert_eq!(text, "Me gustó tu post [[ai]]");
        assert!(generator.prompts.lock().is_empty());
    }

    #[test]
    fn test_prompt_is_bounded() {
        let mut cfg = PersonalizationConfig::default();
        cfg.prompt_max_chars = 40;
        let s = MessageSelector::new(&cfg, 1000);
        let prompt = s.build_prompt(&"x".repeat(500), &target("ana"), None);
        assert!(prompt.chars().count() <= 40);
    }
}
