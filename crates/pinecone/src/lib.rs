//! A vector index backed by a Pinecone-compatible data plane.

#[macro_use]
extern crate tracing;

mod config;
mod proto;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use prof_buzz_model::{
    ErrorKind, IndexQuery, ProviderError, RetrievalMatch, VectorIndex,
};
use reqwest::{Client, Response};
use tokio::sync::OnceCell;

pub use config::{PineconeConfig, PineconeConfigBuilder};
use proto::{DescribeIndexResponse, QueryResponse};

const API_KEY_HEADER: &str = "Api-Key";

/// Error type for [`PineconeIndex`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

struct Inner {
    client: Client,
    config: PineconeConfig,
    // Resolved once from the control plane when no host is configured.
    host: OnceCell<String>,
}

/// A Pinecone index.
///
/// Cloning the index is cheap, and clones share the resolved host.
#[derive(Clone)]
pub struct PineconeIndex {
    inner: Arc<Inner>,
}

impl PineconeIndex {
    /// Creates a new `PineconeIndex` with the given configuration.
    #[inline]
    pub fn new(config: PineconeConfig) -> Self {
        let host = match &config.host {
            Some(host) => OnceCell::new_with(Some(host.clone())),
            None => OnceCell::new(),
        };
        Self {
            inner: Arc::new(Inner {
                client: Client::new(),
                config,
                host,
            }),
        }
    }
}

impl fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("config", &self.inner.config)
            .field("host", &self.inner.host.get())
            .finish()
    }
}

impl Inner {
    async fn host(&self) -> Result<&str, Error> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/indexes/{}",
                    self.config.control_plane_url, self.config.index_name
                );
                debug!("resolving index host from {url}");
                let resp = self
                    .client
                    .get(url)
                    .header(API_KEY_HEADER, &self.config.api_key)
                    .send()
                    .await;
                let resp = check_status(resp).await?;
                let desc: DescribeIndexResponse =
                    resp.json().await.map_err(|err| {
                        Error::new(format!("{err}"), ErrorKind::InvalidResponse)
                    })?;
                info!("index {} is served at {}", self.config.index_name, desc.host);
                Ok::<_, Error>(config::normalize_host(&desc.host))
            })
            .await?;
        Ok(host)
    }

    async fn query(&self, query: IndexQuery) -> Result<Vec<RetrievalMatch>, Error> {
        let host = self.host().await?;
        let body = proto::create_query_request(&query);
        let resp = self
            .client
            .post(format!("{host}/query"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await;
        let resp = check_status(resp).await?;
        let resp: QueryResponse = resp.json().await.map_err(|err| {
            Error::new(format!("{err}"), ErrorKind::InvalidResponse)
        })?;
        trace!("got {} matches", resp.matches.len());
        Ok(resp.matches)
    }
}

impl VectorIndex for PineconeIndex {
    type Error = Error;

    fn query(
        &self,
        query: &IndexQuery,
    ) -> impl Future<Output = Result<Vec<RetrievalMatch>, Self::Error>>
    + Send
    + 'static {
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        async move { inner.query(query).await }
    }
}

async fn check_status(
    resp: Result<Response, reqwest::Error>,
) -> Result<Response, Error> {
    let resp =
        resp.map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    error!("index returned {status}: {body}");
    Err(Error::new(
        format!("{status}: {body}"),
        ErrorKind::from_status(status.as_u16()),
    ))
}
