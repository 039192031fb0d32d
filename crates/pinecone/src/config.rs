use std::fmt::Debug;

const DEFAULT_CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const DEFAULT_INDEX_NAME: &str = "rag";

/// Builder for [`PineconeConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PineconeConfigBuilder {
    api_key: String,
    index_name: Option<String>,
    host: Option<String>,
    control_plane_url: Option<String>,
}

impl PineconeConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            index_name: None,
            host: None,
            control_plane_url: None,
        }
    }

    /// Sets the name of the index. The data-plane host of the index is
    /// looked up by this name unless [`with_host`] is also used.
    ///
    /// [`with_host`]: Self::with_host
    #[inline]
    pub fn with_index_name<S: Into<String>>(mut self, name: S) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Sets the data-plane host of the index, skipping the lookup. A bare
    /// host name is served over HTTPS.
    #[inline]
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets a custom control-plane URL used for the host lookup.
    #[inline]
    pub fn with_control_plane_url<S: Into<String>>(mut self, url: S) -> Self {
        self.control_plane_url = Some(url.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> PineconeConfig {
        PineconeConfig {
            api_key: self.api_key,
            index_name: self
                .index_name
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            host: self.host.map(|h| normalize_host(&h)),
            control_plane_url: self
                .control_plane_url
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_URL.to_string())
                .trim_end_matches('/')
                .to_owned(),
        }
    }
}

impl Debug for PineconeConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeConfigBuilder")
            .field("api_key", &"<deducted>")
            .field("index_name", &self.index_name)
            .field("host", &self.host)
            .field("control_plane_url", &self.control_plane_url)
            .finish()
    }
}

/// Configuration for a Pinecone-compatible index.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PineconeConfig {
    pub(crate) api_key: String,
    pub(crate) index_name: String,
    pub(crate) host: Option<String>,
    pub(crate) control_plane_url: String,
}

impl Debug for PineconeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("api_key", &"<deducted>")
            .field("index_name", &self.index_name)
            .field("host", &self.host)
            .field("control_plane_url", &self.control_plane_url)
            .finish()
    }
}

/// Turns a host as reported by the control plane (no scheme) into a base
/// URL.
pub(crate) fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    }
}
