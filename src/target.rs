//! The third-party service whose session is being acquired.

use url::Url;

/// Default service base URL.
pub const DEFAULT_BASE_URL: &str = "https://v0.dev";

/// Endpoint that returns the current user when the session is authenticated.
pub const USER_ENDPOINT: &str = "/api/user";

/// Candidate pages tried by the alternate-endpoint probe, in order:
/// home page, app page, session introspection.
pub const ALTERNATE_ENDPOINTS: [&str; 3] = ["/", "/chat", "/api/auth/session"];

/// Errors building a [`TargetService`].
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base URL '{0}' has no host")]
    MissingHost(String),
}

/// Base URL, cookie domain and probe endpoints of the target service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetService {
    base_url: Url,
    domain: String,
    user_endpoint: String,
    alternate_endpoints: Vec<String>,
}

impl TargetService {
    /// Creates a target from a base URL such as `https://v0.dev`.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] if the URL is malformed or has no host.
    pub fn new(base_url: &str) -> Result<Self, TargetError> {
        let parsed = Url::parse(base_url).map_err(|source| TargetError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| TargetError::MissingHost(base_url.to_string()))?
            .to_string();

        Ok(Self {
            base_url: parsed,
            domain,
            user_endpoint: USER_ENDPOINT.to_string(),
            alternate_endpoints: ALTERNATE_ENDPOINTS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Overrides the alternate endpoint list.
    #[must_use]
    pub fn with_alternate_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.alternate_endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host used as the default cookie domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The page opened in the external browser for login.
    #[must_use]
    pub fn login_url(&self) -> Url {
        self.base_url.clone()
    }

    /// Absolute URL of the current-user endpoint.
    #[must_use]
    pub fn user_url(&self) -> Url {
        self.join(&self.user_endpoint)
    }

    /// Absolute URLs of the alternate endpoints, in probe order.
    #[must_use]
    pub fn alternate_urls(&self) -> Vec<Url> {
        self.alternate_endpoints
            .iter()
            .map(|endpoint| self.join(endpoint))
            .collect()
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }
}

impl Default for TargetService {
    fn default() -> Self {
        match Self::new(DEFAULT_BASE_URL) {
            Ok(target) => target,
            Err(_) => unreachable!("DEFAULT_BASE_URL is a valid absolute URL"),
        }
    }
}
