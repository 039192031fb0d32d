use std::error::Error;

use crate::error::ErrorKind;
use crate::request::CompletionRequest;
use crate::response::CompletionResponse;
use crate::retrieval::{Embedding, IndexQuery, RetrievalMatch};

/// The error type for a provider.
pub trait ProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that turns text into embeddings.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
pub trait EmbeddingProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ProviderError;

    /// Requests an embedding for `input`.
    fn embed(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static;
}

/// A managed index of vectors that can be queried for nearest neighbors.
pub trait VectorIndex: Send + Sync {
    /// The error type that may be returned by the index.
    type Error: ProviderError;

    /// Queries the index. Matches are returned in the order the index
    /// ranks them.
    fn query(
        &self,
        query: &IndexQuery,
    ) -> impl Future<Output = Result<Vec<RetrievalMatch>, Self::Error>>
    + Send
    + 'static;
}

/// A language model that streams completions.
pub trait CompletionProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ProviderError;

    /// The response type for this provider.
    type Response: CompletionResponse<Error = Self::Error>;

    /// Sends a request to the model.
    ///
    /// The returned future resolves once the provider has accepted the
    /// request, the text itself is pulled out of the response.
    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
