//! A provider for OpenAI-compatible APIs, covering both embeddings and
//! streamed chat completions.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use prof_buzz_model::{
    CompletionProvider, CompletionRequest, Embedding, EmbeddingProvider,
    ErrorKind, ProviderError,
};
use reqwest::{Client, Response, header};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
use proto::EmbeddingResponse;
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl EmbeddingProvider for OpenAIProvider {
    type Error = Error;

    fn embed(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static
    {
        let body = proto::create_embedding_request(input, &self.config);
        let resp_fut = self
            .client
            .post(self.config.endpoint("/embeddings"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send();

        async move {
            let resp = check_status(resp_fut.await).await?;
            let mut resp: EmbeddingResponse = resp.json().await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::InvalidResponse)
            })?;
            trace!("got {} embeddings", resp.data.len());

            // Only one input is sent, but keep the server's indexing in mind.
            resp.data.sort_by_key(|d| d.index);
            let Some(data) = resp.data.into_iter().next() else {
                return Err(Error::new(
                    "no embedding in the response",
                    ErrorKind::InvalidResponse,
                ));
            };
            Ok(Embedding(data.embedding))
        }
    }
}

impl CompletionProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_chat_request(req, &self.config);
        let resp_fut = self
            .client
            .post(self.config.endpoint("/chat/completions"))
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&openai_req)
            .send();

        async move {
            let resp = check_status(resp_fut.await).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}

async fn check_status(
    resp: Result<Response, reqwest::Error>,
) -> Result<Response, Error> {
    let resp =
        resp.map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    error!("provider returned {status}: {body}");
    Err(Error::new(
        format!("{status}: {body}"),
        ErrorKind::from_status(status.as_u16()),
    ))
}
