use std::pin::Pin;
use std::task::{self, Poll};

use crate::provider::ProviderError;

/// A streamed response from the completion provider.
pub trait CompletionResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ProviderError;

    /// Attempts to pull out the next text fragment from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next fragment. Implementations will ensure that the current
    ///   task will be notified when the next fragment may be ready.
    /// - `Poll::Ready(Ok(Some(delta)))` means the response has a fragment
    ///   to deliver, and may produce further fragments on subsequent
    ///   `poll_next_delta` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   receiving the response.
    ///
    /// Fragments must be delivered in the order the model produced them.
    /// Calling this method after completion or an error should always
    /// return `None`.
    fn poll_next_delta(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>>;
}
