//! # API Module
//!
//! Answer generation against an OpenAI-compatible chat completions endpoint
//! (Groq by default), behind the [`Completer`] capability trait.
//!
//! Each call sends one user message and returns the text of the first choice.
//! Provider failures (rate limits, timeouts, bad requests) come back unchanged as
//! [`RagError::Completion`]; nothing here retries or substitutes an answer. The
//! client's built-in backoff on 429/5xx is disabled, so a rate limit fails the
//! call immediately.
//!
//! # Example
//!
//! ```no_run
//! use patient_rag::api::{Completer, OpenAiCompleter};
//! use patient_rag::config::RagConfig;
//!
//! # async fn run() -> patient_rag::error::Result<()> {
//! let config = RagConfig { api_key: "gsk_...".into(), ..RagConfig::default() };
//! let completer = OpenAiCompleter::new(&config);
//! let text = completer.complete("Say hello.", 0.1, 32).await?;
//! println!("{text}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use backoff::ExponentialBackoffBuilder;
use std::{future::Future, time::Duration};
use tracing::debug;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// Prompt in, generated text out.
pub trait Completer {
    fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String>>;
}

/// Creates a new OpenAI API client from configuration, with retries disabled.
fn create_client(config: &RagConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    let no_retry = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build();
    debug!("Client created for {}", config.api_base);
    Client::with_config(openai_config).with_backoff(no_retry)
}

/// [`Completer`] backed by `async-openai`.
pub struct OpenAiCompleter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompleter {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            client: create_client(config),
            model: config.llm_model.clone(),
        }
    }
}

impl Completer for OpenAiCompleter {
    #[allow(deprecated)]
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(vec![message.into()])
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()?;

        debug!("Sending completion request to model {}", self.model);
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::MalformedCompletion("response contained no choices".into()))?
            .message
            .content
            .ok_or_else(|| RagError::MalformedCompletion("first choice has no content".into()))
    }
}
