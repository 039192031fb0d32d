use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prof_buzz_core::chat::{ChatEvent, ChatState, MessageId, Turn};
use reqwest::Client;

type UpdateFn = Arc<dyn Fn(&ChatState) + Send + Sync>;

/// Error type for [`ChatClient`].
#[derive(Debug)]
pub enum ClientError {
    /// The request could not be sent, or the body could not be read.
    Transport(reqwest::Error),
    /// The server answered with a non-success status.
    Status {
        /// The HTTP status code.
        status: u16,
        /// The error message reported by the server.
        message: String,
    },
    /// The response body is not valid UTF-8.
    Decode,
}

impl Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(err) => write!(f, "transport error: {err}"),
            ClientError::Status { status, message } => {
                write!(f, "server returned {status}: {message}")
            }
            ClientError::Decode => write!(f, "response is not valid UTF-8"),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err)
    }
}

/// [`ChatClient`] builder.
pub struct ChatClientBuilder {
    endpoint: String,
    http: Option<Client>,
    greeting: bool,
    on_update: Option<UpdateFn>,
}

impl ChatClientBuilder {
    /// Creates a builder for a client talking to the chat endpoint at
    /// `endpoint`.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: None,
            greeting: true,
            on_update: None,
        }
    }

    /// Uses the given HTTP client instead of a default one.
    #[inline]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets whether the conversation starts with the assistant's greeting.
    /// Defaults to `true`.
    #[inline]
    pub fn with_greeting(mut self, greeting: bool) -> Self {
        self.greeting = greeting;
        self
    }

    /// Attaches a callback to be invoked with every new state snapshot.
    #[inline]
    pub fn on_update(
        mut self,
        on_update: impl Fn(&ChatState) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(on_update));
        self
    }

    /// Builds the client.
    pub fn build(self) -> ChatClient {
        let state = if self.greeting {
            ChatState::with_greeting()
        } else {
            ChatState::new()
        };
        ChatClient {
            inner: Arc::new(Inner {
                http: self.http.unwrap_or_default(),
                endpoint: self.endpoint,
                state: Mutex::new(state),
                on_update: self.on_update,
            }),
        }
    }
}

struct Inner {
    http: Client,
    endpoint: String,
    state: Mutex<ChatState>,
    on_update: Option<UpdateFn>,
}

/// A client of the chat endpoint that keeps the conversation state.
///
/// Cloning the client is cheap, and clones share the conversation.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    /// Returns the current state snapshot.
    #[inline]
    pub fn state(&self) -> ChatState {
        self.lock_state().clone()
    }

    /// Sends a user message and streams the answer into the state.
    ///
    /// Returns `Ok(false)` without sending anything if `content` is blank
    /// or the previous answer is still streaming. If the answer fails
    /// halfway, the text received so far stays in the conversation.
    pub async fn send_message(&self, content: &str) -> Result<bool, ClientError> {
        let Some(turn) = self.begin_turn(content) else {
            return Ok(false);
        };
        let target = turn.assistant_id;

        let result = self.stream_turn(turn).await;
        let event = match &result {
            Ok(()) => ChatEvent::Finished { target },
            Err(err) => {
                error!("failed to receive the answer: {err}");
                ChatEvent::Failed {
                    target,
                    reason: err.to_string(),
                }
            }
        };
        self.apply(event);
        result.map(|()| true)
    }

    fn begin_turn(&self, content: &str) -> Option<Turn> {
        let (snapshot, turn) = {
            let mut state = self.lock_state();
            let (next, turn) = state.begin_turn(content)?;
            *state = next;
            (state.clone(), turn)
        };
        self.notify(&snapshot);
        Some(turn)
    }

    async fn stream_turn(&self, turn: Turn) -> Result<(), ClientError> {
        let target = turn.assistant_id;
        debug!("sending {} messages for {target}", turn.payload.len());
        let mut resp = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .json(&turn.payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let mut decoder = Utf8Decoder::default();
        while let Some(chunk) = resp.chunk().await? {
            trace!("received {} bytes", chunk.len());
            let text = decoder.decode(&chunk)?;
            self.push_delta(target, text);
        }
        decoder.finish()
    }

    fn push_delta(&self, target: MessageId, text: String) {
        if text.is_empty() {
            return;
        }
        self.apply(ChatEvent::Delta { target, text });
    }

    fn apply(&self, event: ChatEvent) {
        let snapshot = {
            let mut state = self.lock_state();
            *state = state.apply(event);
            state.clone()
        };
        self.notify(&snapshot);
    }

    // Observers run outside of the lock so they may call `state()`.
    fn notify(&self, snapshot: &ChatState) {
        if let Some(on_update) = &self.inner.on_update {
            on_update(snapshot);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChatState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

/// Decodes UTF-8 text that may be split at arbitrary byte positions.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Returns the text completed by `bytes`. A trailing incomplete
    /// sequence is kept for the next call.
    fn decode(&mut self, bytes: &[u8]) -> Result<String, ClientError> {
        self.pending.extend_from_slice(bytes);
        let valid_len = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(ClientError::Decode),
        };
        let rest = self.pending.split_off(valid_len);
        let text = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(text).map_err(|_| ClientError::Decode)
    }

    fn finish(self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Decode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_carries_split_sequences() {
        let text = "Dr. Müller ⭐";
        let bytes = text.as_bytes();
        let mut decoder = Utf8Decoder::default();
        let mut decoded = String::new();
        for byte in bytes {
            decoded.push_str(&decoder.decode(&[*byte]).unwrap());
        }
        assert_eq!(decoded, text);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_decoder_rejects_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert!(matches!(
            decoder.decode(b"ok \xff"),
            Err(ClientError::Decode)
        ));
    }

    #[test]
    fn test_decoder_rejects_truncated_end() {
        let mut decoder = Utf8Decoder::default();
        let star = "⭐".as_bytes();
        assert_eq!(decoder.decode(&star[..2]).unwrap(), "");
        assert!(matches!(decoder.finish(), Err(ClientError::Decode)));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":"Malformed request: empty"}"#),
            "Malformed request: empty"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
