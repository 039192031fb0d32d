use prof_buzz_model::{IndexQuery, RetrievalMatch};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<RetrievalMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct DescribeIndexResponse {
    pub host: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    vector: &'a [f32],
    top_k: u32,
    include_metadata: bool,
    include_values: bool,
}

#[inline]
pub fn create_query_request(query: &IndexQuery) -> QueryRequest<'_> {
    QueryRequest {
        namespace: query.namespace.as_deref(),
        vector: &query.vector.0,
        top_k: query.top_k,
        include_metadata: query.include_metadata,
        include_values: false,
    }
}
