//! Markdown quiz grammar.
//!
//! ```text
//! What is the capital of France?      <- question line, opens a block
//! - [x] Paris                         <- option, marked correct
//! - [ ] Lyon
//! - [ ] Nice
//! - [ ] Lille
//!                                     <- blank line closes the block
//! ```
//!
//! Any other non-empty line is a question line and also closes the previous
//! block. Every violation is collected; parsing never stops at the first one.
//!
//! Lines that look like options but break the `- [ ] text` shape (`-[x]a`,
//! `- [x]` with no text) still count as options and are reported as violations.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{FormatViolations, GuardError, GuardResult, Violation};

/// Options required per question.
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizOption {
    pub text: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizQuestion {
    pub question: String,
    /// 1-based line of the question text.
    pub line: usize,
    pub options: Vec<QuizOption>,
}

/// A quiz that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedQuiz {
    pub questions: Vec<QuizQuestion>,
}

impl ParsedQuiz {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Anything option-like, including malformed ones.
fn option_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^-\s*\[([ xX])\]\s*(.*)$").ok())
        .as_ref()
}

fn strict_option_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^-\s\[[ xX]\]\s+\S").ok())
        .as_ref()
}

fn parse_option(line: &str) -> Option<QuizOption> {
    let caps = option_pattern()?.captures(line)?;
    Some(QuizOption {
        correct: caps[1].eq_ignore_ascii_case("x"),
        text: caps[2].trim().to_string(),
    })
}

fn option_shape_violation(line: &str, option: &QuizOption) -> Option<&'static str> {
    if option.text.is_empty() {
        return Some("option text is empty");
    }
    match strict_option_pattern() {
        Some(strict) if strict.is_match(line) => None,
        _ => Some("option must be written as '- [ ] text'"),
    }
}

fn close_block(block: Option<QuizQuestion>, questions: &mut Vec<QuizQuestion>, violations: &mut Vec<Violation>) {
    let Some(block) = block else {
        return;
    };
    if block.options.len() != OPTIONS_PER_QUESTION {
        violations.push(Violation::new(
            block.line,
            format!(
                "expected {} options, found {}",
                OPTIONS_PER_QUESTION,
                block.options.len()
            ),
        ));
    }
    if !block.options.is_empty() && !block.options.iter().any(|o| o.correct) {
        violations.push(Violation::new(block.line, "no option is marked correct"));
    }
    questions.push(block);
}

/// Parse and validate quiz markdown.
pub fn validate_markdown_quiz_format(markdown: &str) -> GuardResult<ParsedQuiz> {
    let mut questions = Vec::new();
    let mut violations = Vec::new();
    let mut current: Option<QuizQuestion> = None;

    for (idx, raw) in markdown.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            close_block(current.take(), &mut questions, &mut violations);
            continue;
        }

        if let Some(option) = parse_option(line) {
            if let Some(message) = option_shape_violation(line, &option) {
                violations.push(Violation::new(line_no, message));
            }
            match current.as_mut() {
                Some(block) => block.options.push(option),
                None => violations.push(Violation::new(line_no, "option outside of a question block")),
            }
            continue;
        }

        close_block(current.take(), &mut questions, &mut violations);
        if !line.ends_with('?') {
            violations.push(Violation::new(line_no, "question must end with '?'"));
        }
        current = Some(QuizQuestion {
            question: line.to_string(),
            line: line_no,
            options: Vec::new(),
        });
    }
    close_block(current.take(), &mut questions, &mut violations);

    if questions.is_empty() {
        violations.push(Violation::new(1, "no questions found"));
    }

    if violations.is_empty() {
        Ok(ParsedQuiz { questions })
    } else {
        violations.sort_by_key(|v| v.line);
        Err(GuardError::Format(FormatViolations(violations)))
    }
}

/// Remove a surrounding ```` ``` ```` or ```` ```markdown ```` fence.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
