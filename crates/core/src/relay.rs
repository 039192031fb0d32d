//! The retrieval-and-completion handler.

#[cfg(test)]
mod tests;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::Stream;
use prof_buzz_model::{
    CompletionProvider, EmbeddingProvider, IndexQuery, Message, VectorIndex,
};

use crate::error::{Error, ErrorKind};
use crate::prompt::{self, DEFAULT_SYSTEM_PROMPT};
use crate::upstream::{
    CompletionClient, DeltaStream, EmbeddingClient, IndexClient,
};

const DEFAULT_TOP_K: u32 = 5;
const DEFAULT_NAMESPACE: &str = "ns1";

#[derive(Debug)]
struct RelayConfig {
    system_prompt: String,
    top_k: u32,
    namespace: Option<String>,
}

/// [`ChatRelay`] builder.
pub struct ChatRelayBuilder {
    embedder: EmbeddingClient,
    index: IndexClient,
    completion: CompletionClient,
    config: RelayConfig,
}

impl ChatRelayBuilder {
    /// Creates a new builder with the three upstream services.
    #[inline]
    pub fn with_providers<E, I, C>(embedder: E, index: I, completion: C) -> Self
    where
        E: EmbeddingProvider + 'static,
        I: VectorIndex + 'static,
        C: CompletionProvider + 'static,
    {
        Self {
            embedder: EmbeddingClient::new(embedder),
            index: IndexClient::new(index),
            completion: CompletionClient::new(completion),
            config: RelayConfig {
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
                top_k: DEFAULT_TOP_K,
                namespace: Some(DEFAULT_NAMESPACE.to_owned()),
            },
        }
    }

    /// Replaces the system instruction placed before the conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    /// Sets how many neighbors are retrieved. At least one is always
    /// requested.
    #[inline]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.config.top_k = top_k.max(1);
        self
    }

    /// Sets the index namespace to search in. `None` searches the default
    /// namespace of the index.
    #[inline]
    pub fn with_namespace<S: Into<String>>(mut self, namespace: Option<S>) -> Self {
        self.config.namespace = namespace.map(Into::into);
        self
    }

    /// Builds the relay.
    #[inline]
    pub fn build(self) -> ChatRelay {
        info!(
            "relay configured with top_k = {}, namespace = {:?}",
            self.config.top_k, self.config.namespace
        );
        ChatRelay {
            embedder: self.embedder,
            index: self.index,
            completion: self.completion,
            config: Arc::new(self.config),
        }
    }
}

/// Answers a conversation with a completion augmented by retrieval results.
///
/// The relay is cheap to clone, and clones share the upstream clients.
/// Nothing is cached or retried: every call performs one embedding, one
/// index query and one completion request.
#[derive(Clone)]
pub struct ChatRelay {
    embedder: EmbeddingClient,
    index: IndexClient,
    completion: CompletionClient,
    config: Arc<RelayConfig>,
}

impl ChatRelay {
    /// Handles one user turn.
    ///
    /// Every step up to the start of the completion happens before this
    /// method returns, so failures there surface as `Err`. Failures after
    /// that are delivered through the returned stream.
    pub async fn respond(
        &self,
        conversation: &[Message],
    ) -> Result<RelayStream, Error> {
        let Some((last, history)) = conversation.split_last() else {
            return Err(Error::malformed_request("the conversation is empty"));
        };
        if last.content.trim().is_empty() {
            return Err(Error::malformed_request(
                "the last message has no content",
            ));
        }
        let text = &last.content;
        debug!("handling a conversation of {} messages", conversation.len());

        let embedding = self.embedder.embed(text).await.map_err(|err| {
            error!("embedding failed: {err}");
            Error::upstream(ErrorKind::UpstreamEmbedding, &*err)
        })?;
        if embedding.is_empty() {
            return Err(Error::with_message(
                ErrorKind::UpstreamEmbedding,
                "the embedding is empty",
            ));
        }

        let query = IndexQuery {
            vector: embedding,
            top_k: self.config.top_k,
            include_metadata: true,
            namespace: self.config.namespace.clone(),
        };
        let matches = self.index.query(&query).await.map_err(|err| {
            error!("index query failed: {err}");
            Error::upstream(ErrorKind::UpstreamRetrieval, &*err)
        })?;
        debug!("retrieved {} matches", matches.len());

        let retrieval_text = prompt::format_matches(&matches);
        let request = prompt::build_prompt(
            &self.config.system_prompt,
            history,
            text,
            &retrieval_text,
        );
        trace!("sending completion request: {request:?}");

        let deltas =
            self.completion.send_request(&request).await.map_err(|err| {
                error!("completion request failed: {err}");
                Error::upstream(ErrorKind::UpstreamCompletion, &*err)
            })?;
        Ok(RelayStream::new(deltas))
    }
}

/// The completion text of one turn, as UTF-8 byte chunks.
///
/// Chunks are yielded in the order the model produced them, each as soon
/// as it arrives. If the completion breaks, one [`ErrorKind::StreamRelay`]
/// error is yielded and the stream ends.
pub struct RelayStream {
    deltas: Option<DeltaStream>,
    forwarded: usize,
}

impl RelayStream {
    fn new(deltas: DeltaStream) -> Self {
        Self {
            deltas: Some(deltas),
            forwarded: 0,
        }
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(deltas) = &mut this.deltas else {
                return Poll::Ready(None);
            };
            match ready!(deltas.as_mut().poll_next(cx)) {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    this.forwarded += delta.len();
                    trace!("forwarding {} bytes", delta.len());
                    return Poll::Ready(Some(Ok(Bytes::from(delta))));
                }
                Some(Err(err)) => {
                    this.deltas = None;
                    error!(
                        "completion broke after {} bytes: {err}",
                        this.forwarded
                    );
                    return Poll::Ready(Some(Err(Error::upstream(
                        ErrorKind::StreamRelay,
                        &*err,
                    ))));
                }
                None => {
                    this.deltas = None;
                    debug!("relayed {} bytes", this.forwarded);
                    return Poll::Ready(None);
                }
            }
        }
    }
}
