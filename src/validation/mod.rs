//! Response validation.
//!
//! # Responsibilities
//! - Pull generated text out of each backend's wire shape
//! - Screen the text for dangerous content
//! - Enforce the quiz markdown grammar
//!
//! # Data Flow
//! ```text
//! raw JSON ──► schema::ResponseShape::extract ──► safety::check_content_safety
//!          ──► quiz::strip_code_fences ──► quiz::validate_markdown_quiz_format
//! ```
//!
//! # Design Decisions
//! - Extractors are pure functions; recording the outcome against the circuit
//!   breaker is the caller's job
//! - Format validation returns all violations, not just first

pub mod quiz;
pub mod safety;
pub mod schema;

pub use quiz::{strip_code_fences, validate_markdown_quiz_format, ParsedQuiz, QuizOption, QuizQuestion};
pub use safety::check_content_safety;
pub use schema::ResponseShape;
