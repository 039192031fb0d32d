use serde::{Deserialize, Serialize};

/// The events in a preset completion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// A text fragment.
    #[serde(rename = "delta")]
    Delta(String),
    /// The stream breaks with an error.
    #[serde(rename = "error")]
    Error(String),
}

/// The preset completion for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request itself is rejected before any event.
    #[serde(default)]
    pub rejected: bool,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejected: false,
        }
    }

    /// Creates a `PresetResponse` streaming the given fragments.
    #[inline]
    pub fn with_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            deltas
                .into_iter()
                .map(|d| PresetEvent::Delta(d.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetResponse` whose request is rejected.
    #[inline]
    pub fn rejected() -> Self {
        Self {
            events: vec![],
            rejected: true,
        }
    }
}
