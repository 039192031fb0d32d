//! Local fake providers for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use prof_buzz_model::{
    CompletionProvider, CompletionRequest, CompletionResponse, Embedding,
    EmbeddingProvider, ErrorKind, IndexQuery, ProviderError, RetrievalMatch,
    VectorIndex,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// Error type for the fake providers.
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
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

/// A shared record of the calls made to a fake provider.
#[derive(Debug)]
pub struct CallLog<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self(Default::default())
    }
}

impl<T: Clone> CallLog<T> {
    fn push(&self, item: T) {
        self.0.lock().expect("call log is poisoned").push(item);
    }

    /// Returns every recorded call, oldest first.
    pub fn calls(&self) -> Vec<T> {
        self.0.lock().expect("call log is poisoned").clone()
    }

    /// Returns how many calls were recorded.
    pub fn len(&self) -> usize {
        self.0.lock().expect("call log is poisoned").len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------
// Embeddings
// ----------

/// A fake embedding provider that returns the same vector for any input.
#[derive(Clone, Debug)]
pub struct TestEmbeddingProvider {
    result: Result<Embedding, ErrorKind>,
    inputs: CallLog<String>,
}

impl TestEmbeddingProvider {
    /// Creates a provider returning `vector`.
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            result: Ok(Embedding(vector)),
            inputs: Default::default(),
        }
    }

    /// Creates a provider that always fails with `kind`.
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            result: Err(kind),
            inputs: Default::default(),
        }
    }

    /// Returns the log of the inputs that were embedded.
    pub fn inputs(&self) -> CallLog<String> {
        self.inputs.clone()
    }
}

impl EmbeddingProvider for TestEmbeddingProvider {
    type Error = Error;

    fn embed(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static
    {
        self.inputs.push(input.to_owned());
        ready(
            self.result
                .clone()
                .map_err(|kind| Error::new("embedding failed", kind)),
        )
    }
}

// ------------
// Vector index
// ------------

/// A fake vector index returning preset matches for any query.
#[derive(Clone, Debug)]
pub struct TestVectorIndex {
    result: Result<Vec<RetrievalMatch>, ErrorKind>,
    queries: CallLog<IndexQuery>,
}

impl TestVectorIndex {
    /// Creates an index returning `matches`. Like a real index, no more
    /// than `top_k` of them are returned.
    pub fn new(matches: Vec<RetrievalMatch>) -> Self {
        Self {
            result: Ok(matches),
            queries: Default::default(),
        }
    }

    /// Creates an index that always fails with `kind`.
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            result: Err(kind),
            queries: Default::default(),
        }
    }

    /// Returns the log of the queries that were made.
    pub fn queries(&self) -> CallLog<IndexQuery> {
        self.queries.clone()
    }
}

impl VectorIndex for TestVectorIndex {
    type Error = Error;

    fn query(
        &self,
        query: &IndexQuery,
    ) -> impl Future<Output = Result<Vec<RetrievalMatch>, Self::Error>>
    + Send
    + 'static {
        self.queries.push(query.clone());
        let result = match &self.result {
            Ok(matches) => Ok(matches
                .iter()
                .take(query.top_k as usize)
                .cloned()
                .collect()),
            Err(kind) => Err(Error::new("query failed", *kind)),
        };
        ready(result)
    }
}

// -----------
// Completions
// -----------

/// The streamed response of [`TestCompletionProvider`].
pub struct TestCompletionResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl CompletionResponse for TestCompletionResponse {
    type Error = crate::Error;

    fn poll_next_delta(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let Some(event) = this.events.get(this.event_idx) else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            };
            let result = match event {
                PresetEvent::Delta(delta) => {
                    this.event_idx += 1;
                    Ok(Some(delta.clone()))
                }
                PresetEvent::Error(message) => {
                    // Nothing is delivered after an error.
                    this.event_idx = this.events.len();
                    Err(Error::new(message.clone(), ErrorKind::Other))
                }
            };
            return Poll::Ready(result);
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_delta(cx)
    }
}

/// A local fake completion model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. The n-th request is answered with
/// the n-th preset response. If there are no enough responses in the
/// script, an error will be returned.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestCompletionProvider {
    script: Vec<PresetResponse>,
    delay: Option<Duration>,
    requests: CallLog<CompletionRequest>,
}

impl TestCompletionProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script.push(preset);
    }

    /// Sets the delay before each event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the log of the requests that were sent.
    #[inline]
    pub fn requests(&self) -> CallLog<CompletionRequest> {
        self.requests.clone()
    }
}

impl Debug for TestCompletionProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCompletionProvider")
            .field("script", &self.script.len())
            .field("requests", &self.requests.len())
            .finish()
    }
}

impl CompletionProvider for TestCompletionProvider {
    type Error = crate::Error;
    type Response = TestCompletionResponse;

    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let step_idx = self.requests.len();
        self.requests.push(req.clone());

        let result = match self.script.get(step_idx) {
            None => Err(Error::new(
                "no enough steps",
                ErrorKind::RateLimitExceeded,
            )),
            Some(preset) if preset.rejected => {
                Err(Error::new("request rejected", ErrorKind::Other))
            }
            Some(preset) => Ok(TestCompletionResponse {
                events: preset.events.clone(),
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}
