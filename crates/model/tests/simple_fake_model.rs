use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use prof_buzz_model::{
    CompletionProvider, CompletionRequest, CompletionResponse, ErrorKind,
    Message, ProviderError, Role,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeProviderError(ErrorKind);

impl Display for FakeProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeProviderError {}

impl ProviderError for FakeProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct FakeCompletionResponse {
    fake_items: VecDeque<String>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeCompletionResponse {
    fn new(input: &str) -> Self {
        let fake_items = format!("You said {}", input)
            .split(" ")
            .map(ToString::to_string)
            .collect();
        Self {
            fake_items,
            sleep: None,
        }
    }
}

impl CompletionResponse for FakeCompletionResponse {
    type Error = FakeProviderError;

    fn poll_next_delta(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let Some(mut item) = this.fake_items.pop_front() else {
                return Poll::Ready(Ok(None));
            };
            if !this.fake_items.is_empty() {
                item.push(' ');
            }
            return Poll::Ready(Ok(Some(item)));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_delta(cx)
    }
}

struct FakeCompletionProvider;

impl CompletionProvider for FakeCompletionProvider {
    type Error = FakeProviderError;
    type Response = FakeCompletionResponse;

    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = match req.messages.last() {
            Some(msg) if msg.role == Role::User => {
                Ok(FakeCompletionResponse::new(&msg.content))
            }
            _ => Err(FakeProviderError(ErrorKind::Other)),
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_completion() {
        let provider = FakeCompletionProvider;
        let req = CompletionRequest {
            messages: vec![
                Message::system("Be brief."),
                Message::user("Good morning"),
            ],
        };
        let mut resp = provider.send_request(&req).await.unwrap();

        let mut resp_message = String::new();
        let mut deltas = 0;
        loop {
            let resp_fut =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_delta(cx));
            match resp_fut.await {
                Ok(Some(delta)) => {
                    deltas += 1;
                    resp_message.push_str(&delta);
                }
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(resp_message, "You said Good morning");
        assert_eq!(deltas, 4);
    }

    #[tokio::test]
    async fn test_error() {
        let provider = FakeCompletionProvider;
        let req = CompletionRequest { messages: vec![] };
        let result = provider.send_request(&req).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
