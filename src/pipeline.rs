//! Request orchestration.
//!
//! # Responsibilities
//! - Own the breaker, limiter and signer for the process (`GuardContext`)
//! - Admit generation requests through the rate limiter before any provider call
//! - Hold a concurrency slot for exactly the duration of the provider call
//!
//! # Data Flow
//! ```text
//! QuizGenerator::generate(session, request)
//!     → limiter.admit_generation
//!         checks cooldown, window quota, concurrency; commits only if all pass
//!         returns a slot (RAII, released on every exit path)
//!     → provider.generate
//! ```

use std::sync::Arc;

use crate::clock::{system_clock, SharedClock};
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::provider::{Difficulty, Provider, QuestionCount};
use crate::resilience::CircuitBreaker;
use crate::security::{RateLimiter, RequestSigner};

/// Shared guard state. Build once and share via `Arc`.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub breaker: Arc<CircuitBreaker>,
    pub limiter: Arc<RateLimiter>,
    pub signer: RequestSigner,
    pub clock: SharedClock,
}

impl GuardContext {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &GuardConfig, clock: SharedClock) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(&config.circuit_breaker, Arc::clone(&clock))),
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone(), Arc::clone(&clock))),
            signer: RequestSigner::new(&config.signing, Arc::clone(&clock)),
            clock,
        }
    }
}

/// One quiz generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub content: String,
    pub difficulty: Difficulty,
    pub count: QuestionCount,
}

impl GenerationRequest {
    /// Validate raw caller input.
    pub fn parse(content: impl Into<String>, difficulty: &str, count: u32) -> GuardResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(GuardError::InvalidRequest("source content is empty".to_string()));
        }
        Ok(Self {
            content,
            difficulty: difficulty.parse()?,
            count: QuestionCount::new(count)?,
        })
    }
}

/// Front door for quiz generation.
pub struct QuizGenerator {
    context: Arc<GuardContext>,
    provider: Box<dyn Provider>,
}

impl QuizGenerator {
    pub fn new(context: Arc<GuardContext>, provider: Box<dyn Provider>) -> Self {
        Self { context, provider }
    }

    pub fn context(&self) -> &GuardContext {
        &self.context
    }

    /// Admit the request, then generate validated quiz markdown.
    pub async fn generate(&self, session: &str, request: GenerationRequest) -> GuardResult<String> {
        let _slot = self.context.limiter.admit_generation(session)?;

        tracing::info!(
            session = %session,
            provider = self.provider.name(),
            difficulty = %request.difficulty,
            count = request.count.get(),
            "Generation admitted"
        );

        self.provider
            .generate(&request.content, request.difficulty, request.count)
            .await
    }

    /// Admission hook for document extraction ahead of generation.
    pub fn admit_file_processing(&self, session: &str) -> GuardResult<()> {
        self.context.limiter.record_file_processing(session)
    }
}
