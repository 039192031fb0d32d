use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use prof_buzz_model::{CompletionResponse, ErrorKind};

use crate::Error;
use crate::io::Sse;
use crate::proto::ChatCompletionChunk;

type NextDelta = Result<Option<(String, Sse)>, Error>;

pin_project! {
    /// A streamed chat completion from an OpenAI-compatible server.
    pub struct OpenAIResponse {
        next_delta_fut: Option<BoxFuture<'static, NextDelta>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        Self {
            next_delta_fut: Some(Box::pin(next_delta(sse))),
        }
    }
}

impl CompletionResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_delta(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.project();
        let Some(next_delta_fut) = this.next_delta_fut else {
            return Poll::Ready(Ok(None));
        };
        let (delta, sse) = match ready!(next_delta_fut.as_mut().poll(cx)) {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                *this.next_delta_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_delta_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        // The stream may still have more data to pull, create a new future
        // for the next fragment.
        *this.next_delta_fut = Some(Box::pin(next_delta(sse)));

        Poll::Ready(Ok(Some(delta)))
    }
}

async fn next_delta(mut sse: Sse) -> NextDelta {
    loop {
        let sse_event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(None),
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            return Ok(None);
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::InvalidResponse)
            })?;
        if let Some(err) = chunk.error {
            return Err(Error::new(err.message, ErrorKind::Other));
        }

        // Usage chunks and the like carry no choices, skip them.
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };
        if let Some(finish_reason) = &choice.finish_reason {
            debug!("completion finished: {finish_reason}");
        }
        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                return Ok(Some((content, sse)));
            }
            _ => continue,
        }
    }
}
