//! Prompt templates.
//!
//! Templates use `{{count}}`, `{{difficulty}}` and `{{content}}`. Older
//! templates written with `{x}`, `[x]`, `%x%` or `{{ x }}` and the aliases
//! `num_questions`, `number`, `question_count` (count) and `level`
//! (difficulty) are normalized on load. Unknown names are left untouched, so
//! markdown such as `- [x] answer` survives.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::PromptConfig;
use crate::provider::types::{Difficulty, QuestionCount};

pub const DEFAULT_TEMPLATE: &str = "\
Create {{count}} multiple-choice quiz questions at {{difficulty}} difficulty from the content below.

Rules:
- Write each question on its own line ending with '?'.
- Follow each question with exactly 4 options.
- Write correct options as `- [x] text` and incorrect ones as `- [ ] text`.
- Mark at least one option correct.
- Separate questions with a blank line.
- Return only the quiz markdown, without code fences or commentary.

Content:
{{content}}";

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}|\{(\w+)\}|\[(\w+)\]|%(\w+)%").ok())
        .as_ref()
}

fn canonical_name(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "count" | "num_questions" | "number" | "question_count" => Some("count"),
        "difficulty" | "level" => Some("difficulty"),
        "content" => Some("content"),
        _ => None,
    }
}

/// Rewrite legacy placeholder syntaxes to `{{name}}`.
pub fn normalize_placeholders(template: &str) -> String {
    let Some(pattern) = placeholder_pattern() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures| {
            let name = (1..=4).find_map(|i| caps.get(i)).map(|m| m.as_str()).unwrap_or_default();
            match canonical_name(name) {
                Some(canonical) => format!("{{{{{}}}}}", canonical),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// A normalized instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: &str) -> Self {
        Self {
            template: normalize_placeholders(template),
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        match config.template.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Self::new(t),
            _ => Self::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill in the placeholders. Content is appended when the template has no slot for it.
    pub fn render(&self, content: &str, difficulty: Difficulty, count: QuestionCount) -> String {
        let mut out = self
            .template
            .replace("{{count}}", &count.to_string())
            .replace("{{difficulty}}", difficulty.as_str());

        if out.contains("{{content}}") {
            out = out.replace("{{content}}", content);
        } else {
            out.push_str("\n\n");
            out.push_str(content);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_legacy_syntaxes() {
        assert_eq!(
            normalize_placeholders("{num_questions} [level] %number% {{ question_count }}"),
            "{{count}} {{difficulty}} {{count}} {{count}}"
        );
    }

    #[test]
    fn test_unknown_names_untouched() {
        let t = "- [x] correct\n- [ ] wrong\n{topic} 100%done%";
        assert_eq!(normalize_placeholders(t), t);
    }

    #[test]
    fn test_render_default() {
        let prompt = PromptTemplate::default().render(
            "Cells divide by mitosis.",
            Difficulty::Hard,
            QuestionCount::new(3).unwrap(),
        );
        assert!(prompt.starts_with("Create 3 multiple-choice quiz questions at hard difficulty"));
        assert!(prompt.ends_with("Content:\nCells divide by mitosis."));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_custom_template_without_content_slot() {
        let config = PromptConfig {
            template: Some("Make %num_questions% [level] questions".into()),
        };
        let prompt = PromptTemplate::from_config(&config).render(
            "Text",
            Difficulty::Easy,
            QuestionCount::new(5).unwrap(),
        );
        assert_eq!(prompt, "Make 5 easy questions\n\nText");
    }

    #[test]
    fn test_blank_template_falls_back() {
        let config = PromptConfig {
            template: Some("   ".into()),
        };
        assert_eq!(PromptTemplate::from_config(&config), PromptTemplate::default());
    }
}
