use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A fixed-length vector representing the semantic content of a text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Returns the dimensions of this embedding.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the embedding has no dimensions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A nearest-neighbor query against a vector index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexQuery {
    /// The query vector.
    pub vector: Embedding,
    /// How many neighbors to return.
    pub top_k: u32,
    /// Whether the matches should carry their metadata.
    pub include_metadata: bool,
    /// The logical partition to search in. `None` means the default
    /// namespace of the index.
    pub namespace: Option<String>,
}

/// One neighbor returned by a vector index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    /// The identifier of the stored vector.
    pub id: String,
    /// The similarity score. It is not used for anything downstream.
    #[serde(default)]
    pub score: Option<f32>,
    /// Arbitrary fields stored alongside the vector.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievalMatch {
    /// Creates a match with the given id and no metadata.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            score: None,
            metadata: Map::new(),
        }
    }

    /// Attaches a metadata field.
    #[inline]
    pub fn with_metadata<K: Into<String>, V: Into<Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
