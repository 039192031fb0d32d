use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use prof_buzz_model::{
    CompletionProvider, CompletionRequest, CompletionResponse, Embedding,
    EmbeddingProvider, IndexQuery, ProviderError, RetrievalMatch, VectorIndex,
};
use tracing::Instrument;

pub(crate) type BoxedProviderError = Box<dyn ProviderError>;
type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, BoxedProviderError>> + Send>>;

/// Text fragments of one completion, in arrival order.
pub(crate) type DeltaStream =
    Pin<Box<dyn Stream<Item = Result<String, BoxedProviderError>> + Send>>;

type EmbedFn = Arc<dyn Fn(&str) -> BoxedFuture<Embedding> + Send + Sync>;
type QueryFn =
    Arc<dyn Fn(&IndexQuery) -> BoxedFuture<Vec<RetrievalMatch>> + Send + Sync>;
type CompleteFn =
    Arc<dyn Fn(&CompletionRequest) -> BoxedFuture<DeltaStream> + Send + Sync>;

#[inline]
fn boxed<E: ProviderError>(err: E) -> BoxedProviderError {
    Box::new(err)
}

// The wrappers below erase the provider types, since `ChatRelay` doesn't
// have generic parameters and we don't want it to either.

/// A type-erased [`EmbeddingProvider`].
#[derive(Clone)]
pub(crate) struct EmbeddingClient {
    embed_fn: EmbedFn,
}

impl EmbeddingClient {
    pub fn new<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        let embed_fn: EmbedFn = Arc::new(
            move |input: &str| -> BoxedFuture<Embedding> {
                let fut = provider.embed(input);
                Box::pin(
                    async move { fut.await.map_err(boxed) }
                        .instrument(trace_span!("embed")),
                )
            },
        );
        Self { embed_fn }
    }

    #[inline]
    pub async fn embed(
        &self,
        input: &str,
    ) -> Result<Embedding, BoxedProviderError> {
        (self.embed_fn)(input).await
    }
}

/// A type-erased [`VectorIndex`].
#[derive(Clone)]
pub(crate) struct IndexClient {
    query_fn: QueryFn,
}

impl IndexClient {
    pub fn new<I: VectorIndex + 'static>(index: I) -> Self {
        let query_fn: QueryFn = Arc::new(
            move |query: &IndexQuery| -> BoxedFuture<Vec<RetrievalMatch>> {
                let fut = index.query(query);
                Box::pin(
                    async move { fut.await.map_err(boxed) }
                        .instrument(trace_span!("index query")),
                )
            },
        );
        Self { query_fn }
    }

    #[inline]
    pub async fn query(
        &self,
        query: &IndexQuery,
    ) -> Result<Vec<RetrievalMatch>, BoxedProviderError> {
        (self.query_fn)(query).await
    }
}

/// A type-erased [`CompletionProvider`].
#[derive(Clone)]
pub(crate) struct CompletionClient {
    complete_fn: CompleteFn,
}

impl CompletionClient {
    pub fn new<P: CompletionProvider + 'static>(provider: P) -> Self {
        let complete_fn: CompleteFn = Arc::new(
            move |req: &CompletionRequest| -> BoxedFuture<DeltaStream> {
                let fut = provider.send_request(req);
                Box::pin(
                    async move {
                        let resp = fut.await.map_err(boxed)?;
                        trace!("completion request accepted");
                        Ok::<_, BoxedProviderError>(into_delta_stream(resp))
                    }
                    .instrument(trace_span!("completion req")),
                )
            },
        );
        Self { complete_fn }
    }

    /// Sends a request and returns the fragments as a stream.
    ///
    /// # Cancel safety
    ///
    /// Dropping the stream stops pulling the response, which drops the
    /// underlying connection.
    #[inline]
    pub async fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> Result<DeltaStream, BoxedProviderError> {
        (self.complete_fn)(req).await
    }
}

/// Adapts a response into a stream that ends right after the first error.
fn into_delta_stream<R: CompletionResponse>(resp: R) -> DeltaStream {
    let state = Some(Box::pin(resp));
    Box::pin(stream::unfold(state, |state| async move {
        let Some(mut resp) = state else {
            return None;
        };
        match poll_fn(|cx| resp.as_mut().poll_next_delta(cx)).await {
            Ok(Some(delta)) => Some((Ok(delta), Some(resp))),
            Ok(None) => None,
            Err(err) => {
                error!("got an error: {err:?}");
                Some((Err(boxed(err)), None))
            }
        }
    }))
}
