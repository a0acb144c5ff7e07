//! Durable cross-request session state.
//!
//! A [`Session`] carries everything that outlives a single request/response
//! exchange: the header sets, the cookie store, credentials, client
//! certificates, proxy settings, and the redirect/retry limits. It is created
//! once per logical invocation (or supplied by the caller for reuse), mutated
//! in place by configuration before the first send, and shared across the
//! redirects and retries of one operation.
//!
//! The session is also the factory for the underlying HTTP clients: every
//! client built from it shares the same cookie jar, proxy, certificates, and
//! redirect policy.

mod headers;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::{Client, Identity, Proxy};
use tracing::debug;
use url::Url;

pub use headers::{HeaderBag, is_content_header};

use crate::engine::WebError;

/// Default interval between retry attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// An already-resolved username/password pair.
///
/// Credential *resolution* (prompting, keychains, secret stores) is the
/// host's responsibility; the engine only consumes the final values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Formats the RFC-7617 `Basic` Authorization header value.
    #[must_use]
    pub fn basic_header_value(&self) -> String {
        let unencoded = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(unencoded.as_bytes()))
    }
}

/// Authentication scheme applied to the session before the first send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// No explicit scheme. A plain session credential, if any, is still sent
    /// as a Basic Authorization header.
    #[default]
    None,
    /// RFC-7617 Basic authentication. Requires a session credential.
    Basic,
    /// RFC-6750 Bearer authentication. Requires a session token.
    Bearer,
}

/// Proxy descriptor with its own optional credential.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: Url,
    pub credentials: Option<Credentials>,
    pub use_default_credentials: bool,
}

impl ProxyConfig {
    /// Creates a proxy descriptor without credentials.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            use_default_credentials: false,
        }
    }

    fn to_reqwest(&self) -> Result<Proxy, WebError> {
        let mut proxy = Proxy::all(self.url.as_str())
            .map_err(|source| WebError::client_build("invalid proxy URL", source))?;
        // When both a credential and the default-credentials flag are set,
        // the explicit credential wins (the conflict is rejected earlier).
        if let Some(credentials) = &self.credentials {
            proxy = proxy.basic_auth(&credentials.username, &credentials.password);
        }
        Ok(proxy)
    }
}

/// Durable cross-request configuration and state.
///
/// See the module docs for the lifecycle. Invariant: `headers` and
/// `content_headers` are disjoint; a header whose name appears in the
/// content-header classification table is rerouted into `content_headers`
/// on every request build.
#[derive(Debug, Clone)]
pub struct Session {
    /// User-visible request headers (excludes content headers).
    pub headers: HeaderBag,
    /// Headers that belong on the body (Content-Type, Content-Range, ...).
    pub content_headers: HeaderBag,
    /// Session credential, mutually exclusive with `use_default_credentials`.
    pub credentials: Option<Credentials>,
    /// Use the ambient process identity instead of an explicit credential.
    pub use_default_credentials: bool,
    /// Authentication scheme resolved into an Authorization header by
    /// [`Session::prepare`].
    pub auth: AuthScheme,
    /// Bearer token, required by [`AuthScheme::Bearer`].
    pub token: Option<String>,
    /// Allow credentials and auth schemes over non-HTTPS URIs.
    pub allow_unencrypted_auth: bool,
    /// Optional proxy; `no_proxy` disables proxying entirely.
    pub proxy: Option<ProxyConfig>,
    pub no_proxy: bool,
    /// -1 = unset/default, 0 = disable auto-redirect, N>0 = cap.
    pub maximum_redirection: i32,
    /// Retry policy; retry is only active when the count is > 0.
    pub maximum_retry_count: u32,
    pub retry_interval: Duration,
    /// User-Agent sent when the session headers do not carry one.
    pub user_agent: String,
    /// Send `Connection: close` on every request.
    pub disable_keep_alive: bool,
    /// Per-request timeout; `None` means no limit.
    pub timeout: Option<Duration>,
    /// Attach header values leniently instead of failing on invalid ones.
    pub skip_header_validation: bool,
    /// Skip server certificate verification.
    pub skip_certificate_check: bool,
    certificates: Vec<Identity>,
    cookies: Arc<Jar>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session with default limits and an empty cookie jar.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: HeaderBag::new(),
            content_headers: HeaderBag::new(),
            credentials: None,
            use_default_credentials: false,
            auth: AuthScheme::None,
            token: None,
            allow_unencrypted_auth: false,
            proxy: None,
            no_proxy: false,
            maximum_redirection: -1,
            maximum_retry_count: 0,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            user_agent: crate::default_user_agent(),
            disable_keep_alive: false,
            timeout: None,
            skip_header_validation: false,
            skip_certificate_check: false,
            certificates: Vec::new(),
            cookies: Arc::new(Jar::default()),
        }
    }

    /// Attaches a client certificate to every request in the session.
    ///
    /// The underlying client presents a single identity, so when several are
    /// added the most recently added one is used.
    pub fn add_certificate(&mut self, certificate: Identity) {
        self.certificates.push(certificate);
    }

    /// The cookie jar shared by all clients built from this session.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookies)
    }

    /// Validates the session configuration against the target URI.
    ///
    /// Configuration errors are detected here, before any network activity.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Validation`] for conflicting or incomplete
    /// credential, authentication, and proxy settings.
    pub fn validate(&self, url: &Url) -> Result<(), WebError> {
        if self.use_default_credentials && self.credentials.is_some() {
            return Err(WebError::validation(
                "a credential and the default-credentials flag cannot both be supplied",
            ));
        }

        if self.use_default_credentials && self.auth != AuthScheme::None {
            return Err(WebError::validation(
                "an authentication scheme cannot be combined with default credentials",
            ));
        }

        if self.auth != AuthScheme::None && self.token.is_some() && self.credentials.is_some() {
            return Err(WebError::validation(
                "a token and a credential cannot both be supplied with an authentication scheme",
            ));
        }

        if self.auth == AuthScheme::Basic && self.credentials.is_none() {
            return Err(WebError::validation(
                "Basic authentication requires a credential",
            ));
        }

        if self.auth == AuthScheme::Bearer && self.token.is_none() {
            return Err(WebError::validation("Bearer authentication requires a token"));
        }

        let has_identity = self.credentials.is_some() || self.use_default_credentials;
        if !self.allow_unencrypted_auth
            && (self.auth != AuthScheme::None || has_identity)
            && url.scheme() != "https"
        {
            return Err(WebError::validation(
                "sending credentials over an unencrypted connection requires opting in",
            ));
        }

        if let Some(proxy) = &self.proxy {
            if proxy.use_default_credentials && proxy.credentials.is_some() {
                return Err(WebError::validation(
                    "a proxy credential and the proxy default-credentials flag cannot both be supplied",
                ));
            }
        }

        Ok(())
    }

    /// Validates the configuration and resolves the authentication scheme
    /// into an `Authorization` session header.
    ///
    /// Supplying a plain credential overrides the default-credentials flag
    /// and is sent preemptively as a Basic header.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Validation`] when [`Session::validate`] fails.
    pub fn prepare(&mut self, url: &Url) -> Result<(), WebError> {
        self.validate(url)?;

        match self.auth {
            AuthScheme::Basic => {
                if let Some(credentials) = &self.credentials {
                    self.headers
                        .insert("Authorization", credentials.basic_header_value());
                }
            }
            AuthScheme::Bearer => {
                if let Some(token) = &self.token {
                    self.headers.insert("Authorization", format!("Bearer {token}"));
                }
            }
            AuthScheme::None => {
                if let Some(credentials) = &self.credentials {
                    self.use_default_credentials = false;
                    self.headers
                        .insert("Authorization", credentials.basic_header_value());
                }
            }
        }

        Ok(())
    }

    /// Builds an HTTP client configured from this session.
    ///
    /// `handle_redirect` builds a client with auto-redirect disabled: the
    /// transport executor follows redirects itself when it must re-apply
    /// session headers to each hop. Otherwise the client's own redirect
    /// policy reflects `maximum_redirection`.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::ClientBuild`] when the underlying client cannot
    /// be constructed (e.g. an invalid proxy URL).
    pub fn build_client(&self, handle_redirect: bool) -> Result<Client, WebError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .cookie_provider(self.cookie_jar())
            .gzip(true);

        if self.no_proxy {
            builder = builder.no_proxy();
        } else if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        for identity in &self.certificates {
            builder = builder.identity(identity.clone());
        }

        if self.skip_certificate_check {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if handle_redirect {
            builder = builder.redirect(Policy::none());
        } else if self.maximum_redirection > -1 {
            if self.maximum_redirection == 0 {
                builder = builder.redirect(Policy::none());
            } else {
                let cap = usize::try_from(self.maximum_redirection).unwrap_or(usize::MAX);
                builder = builder.redirect(Policy::limited(cap));
            }
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        debug!(
            handle_redirect,
            maximum_redirection = self.maximum_redirection,
            "building HTTP client"
        );

        builder
            .build()
            .map_err(|source| WebError::client_build("failed to build HTTP client", source))
    }
}
