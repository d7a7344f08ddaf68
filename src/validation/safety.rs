//! Content-safety screening for generated text.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{GuardError, GuardResult};

/// Upper bound on the length of generated content, in characters.
pub const MAX_CONTENT_CHARS: usize = 100_000;

struct Rule {
    name: &'static str,
    pattern: Regex,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("script tag", r"(?i)<script\b"),
            ("server-side code marker", r"<\?(?:php\b)?"),
            ("SQL statement", r"(?i);\s*(?:DROP|DELETE|UPDATE|INSERT)\b"),
            ("javascript image URL", r"(?i)!\[[^\]]*\]\(\s*javascript:"),
        ]
        .into_iter()
        .filter_map(|(name, src)| match Regex::new(src) {
            Ok(pattern) => Some(Rule { name, pattern }),
            Err(e) => {
                tracing::error!(rule = name, error = %e, "Invalid safety pattern");
                None
            }
        })
        .collect()
    })
}

/// Reject text carrying script, server-side code, SQL or oversized payloads.
pub fn check_content_safety(text: &str) -> GuardResult<()> {
    let chars = text.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(GuardError::ContentSafety(format!(
            "content is {} characters, limit is {}",
            chars, MAX_CONTENT_CHARS
        )));
    }

    for rule in rules() {
        if let Some(m) = rule.pattern.find(text) {
            let line = text[..m.start()].matches('\n').count() + 1;
            return Err(GuardError::ContentSafety(format!(
                "{} detected near line {}",
                rule.name, line
            )));
        }
    }
    Ok(())
}
