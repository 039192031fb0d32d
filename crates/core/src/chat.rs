//! Chat client state.
//!
//! [`ChatState`] is an immutable snapshot of what a chat front-end shows.
//! Every transition returns a new snapshot, so observers can keep old
//! ones around without locking.

use std::fmt::{self, Display, Formatter};

use prof_buzz_model::{Message, Role};

/// The greeting shown before the user says anything.
pub const GREETING: &str = "Hi! I'm Prof Buzz, How can I help you today?";

/// Identifies a message within a [`ChatState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// The id of this message.
    pub id: MessageId,
    /// Who wrote it.
    pub role: Role,
    /// The text so far. Assistant messages grow while streaming.
    pub content: String,
}

impl ChatMessage {
    /// Returns the wire form of this message.
    #[inline]
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// What happened to the response of a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A text fragment arrived.
    Delta {
        /// The placeholder the fragment belongs to.
        target: MessageId,
        /// The fragment.
        text: String,
    },
    /// The response ended normally.
    Finished {
        /// The placeholder of the finished turn.
        target: MessageId,
    },
    /// The response could not be completed.
    Failed {
        /// The placeholder of the failed turn.
        target: MessageId,
        /// Why it failed.
        reason: String,
    },
}

/// A turn started by [`ChatState::begin_turn`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    /// The empty assistant message that receives the response.
    pub assistant_id: MessageId,
    /// The conversation to send, ending with the new user message.
    pub payload: Vec<Message>,
}

/// A snapshot of the conversation and the typing indicator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatState {
    messages: Vec<ChatMessage>,
    in_flight: Option<MessageId>,
    next_id: u64,
}

impl ChatState {
    /// Creates an empty state.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state that starts with the assistant's [`GREETING`].
    pub fn with_greeting() -> Self {
        let mut state = Self::new();
        state.push(Role::Assistant, GREETING.to_owned());
        state
    }

    /// Returns the messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the last message, if any.
    #[inline]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Returns the message with `id`.
    #[inline]
    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Returns `true` while a response is pending or streaming.
    #[inline]
    pub fn is_typing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts a turn with the user's `content`.
    ///
    /// Returns `None` if `content` is blank or another turn is still in
    /// flight. Otherwise the returned state has the user message and an
    /// empty assistant placeholder appended, and is typing.
    pub fn begin_turn(&self, content: &str) -> Option<(ChatState, Turn)> {
        if content.trim().is_empty() {
            return None;
        }
        if let Some(id) = self.in_flight {
            debug!("turn {id} is still in flight, ignoring the message");
            return None;
        }

        let mut next = self.clone();
        next.push(Role::User, content.to_owned());
        let payload = next.messages.iter().map(ChatMessage::to_message).collect();
        let assistant_id = next.push(Role::Assistant, String::new());
        next.in_flight = Some(assistant_id);

        Some((
            next,
            Turn {
                assistant_id,
                payload,
            },
        ))
    }

    /// Applies `event` and returns the resulting state.
    ///
    /// Fragments are appended to their target message only. Events for
    /// unknown messages are ignored.
    pub fn apply(&self, event: ChatEvent) -> ChatState {
        let mut next = self.clone();
        match event {
            ChatEvent::Delta { target, text } => {
                let Some(msg) = next.messages.iter_mut().find(|m| m.id == target)
                else {
                    warn!("dropping a fragment for unknown message {target}");
                    return next;
                };
                msg.content.push_str(&text);
            }
            ChatEvent::Finished { target } => next.settle(target),
            ChatEvent::Failed { target, reason } => {
                debug!("turn {target} failed: {reason}");
                next.settle(target);
            }
        }
        next
    }

    fn settle(&mut self, target: MessageId) {
        if self.in_flight == Some(target) {
            self.in_flight = None;
        }
    }

    fn push(&mut self, role: Role, content: String) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(ChatMessage { id, role, content });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        let state = ChatState::with_greeting();
        assert_eq!(state.messages().len(), 1);
        let greeting = state.last().unwrap();
        assert_eq!(greeting.role, Role::Assistant);
        assert_eq!(greeting.content, GREETING);
        assert!(!state.is_typing());
    }

    #[test]
    fn test_begin_turn() {
        let state = ChatState::with_greeting();
        let (next, turn) = state.begin_turn("Who teaches calculus?").unwrap();

        assert_eq!(next.messages().len(), state.messages().len() + 2);
        assert!(next.is_typing());
        let user = &next.messages()[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Who teaches calculus?");
        let placeholder = next.last().unwrap();
        assert_eq!(placeholder.id, turn.assistant_id);
        assert_eq!(placeholder.role, Role::Assistant);
        assert!(placeholder.content.is_empty());

        assert_eq!(
            turn.payload,
            vec![
                Message::assistant(GREETING),
                Message::user("Who teaches calculus?"),
            ]
        );
        // The old snapshot is untouched.
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_blank_message_is_ignored() {
        let state = ChatState::with_greeting();
        assert!(state.begin_turn("").is_none());
        assert!(state.begin_turn(" \t\n").is_none());
    }

    #[test]
    fn test_sends_are_serialized() {
        let (state, turn) = ChatState::new().begin_turn("first").unwrap();
        assert!(state.begin_turn("second").is_none());

        let state = state.apply(ChatEvent::Finished {
            target: turn.assistant_id,
        });
        let (state, turn) = state.begin_turn("second").unwrap();
        assert_eq!(turn.payload.len(), 3);
        assert_eq!(state.messages().len(), 4);
    }

    #[test]
    fn test_streaming_scenario() {
        let (state, turn) = ChatState::with_greeting().begin_turn("Hi").unwrap();
        let target = turn.assistant_id;

        let mut snapshots = vec![state];
        for text in ["Hel", "lo!"] {
            let next = snapshots.last().unwrap().apply(ChatEvent::Delta {
                target,
                text: text.to_owned(),
            });
            snapshots.push(next);
        }
        let done = snapshots.last().unwrap().apply(ChatEvent::Finished { target });
        snapshots.push(done);

        let contents: Vec<_> = snapshots
            .iter()
            .map(|s| s.get(target).unwrap().content.as_str())
            .collect();
        assert_eq!(contents, ["", "Hel", "Hello!", "Hello!"]);
        let typing: Vec<_> = snapshots.iter().map(ChatState::is_typing).collect();
        assert_eq!(typing, [true, true, true, false]);
    }

    #[test]
    fn test_delta_targets_its_message() {
        let (state, turn) = ChatState::new().begin_turn("Hi").unwrap();
        let user_id = state.messages()[0].id;

        let state = state.apply(ChatEvent::Delta {
            target: turn.assistant_id,
            text: "Hello".to_owned(),
        });
        assert_eq!(state.get(user_id).unwrap().content, "Hi");
        assert_eq!(state.get(turn.assistant_id).unwrap().content, "Hello");

        let unknown = MessageId(42);
        let same = state.apply(ChatEvent::Delta {
            target: unknown,
            text: "lost".to_owned(),
        });
        assert_eq!(same, state);
    }

    #[test]
    fn test_failure_keeps_partial_content() {
        let (state, turn) = ChatState::new().begin_turn("Hi").unwrap();
        let target = turn.assistant_id;
        let state = state
            .apply(ChatEvent::Delta {
                target,
                text: "Dr. ".to_owned(),
            })
            .apply(ChatEvent::Failed {
                target,
                reason: "connection reset".to_owned(),
            });
        assert!(!state.is_typing());
        assert_eq!(state.get(target).unwrap().content, "Dr. ");
    }

    #[test]
    fn test_stale_finish_is_ignored() {
        let (state, first) = ChatState::new().begin_turn("one").unwrap();
        let state = state.apply(ChatEvent::Finished {
            target: first.assistant_id,
        });
        let (state, _) = state.begin_turn("two").unwrap();
        let state = state.apply(ChatEvent::Finished {
            target: first.assistant_id,
        });
        assert!(state.is_typing());
    }
}
