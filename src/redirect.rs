//! Meta-refresh redirect resolution
//!
//! The document host does not answer with HTTP 3xx redirects. A document
//! request returns `200 OK` with an HTML page whose
//! `<meta http-equiv="refresh" content="1; URL=...">` points at the next hop,
//! and every hop needs a fresh set of session cookies obtained from a fixed
//! login endpoint. The login endpoint itself answers with a 302 that must not
//! be followed: the cookies are on the 302.
//!
//! [`RedirectResolver::resolve`] runs that chain as a loop:
//!
//! ```text
//! Fetching ──html + refresh──▶ Redirecting ──login, new cookie──▶ Fetching
//!    │
//!    ├─ 200 + expected type ──▶ Terminal(success)
//!    └─ anything else ────────▶ Terminal(failure)
//! ```
//!
//! The decision for a single response lives in the pure [`classify`]
//! function so it can be tested without a network.

use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use scraper::{Html, Selector};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Error, ProtocolError, Result};

/// A successfully resolved document
#[derive(Clone, Debug)]
pub struct Artifact {
    /// URL of the terminal response
    pub url: Url,
    /// Declared content type of the terminal response
    pub content_type: String,
    /// Response body
    pub bytes: Vec<u8>,
}

/// State carried between hops
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectSession {
    /// Next URL to fetch
    pub target: Url,
    /// Cookie header for the next request, `None` on the first hop
    pub cookie: Option<String>,
    /// Meta-refresh redirects followed so far
    pub hops: usize,
}

impl RedirectSession {
    /// Start a session at `target` with no cookies
    pub fn new(target: Url) -> Self {
        Self {
            target,
            cookie: None,
            hops: 0,
        }
    }
}

/// What to do after one response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Follow the refresh directive to this URL
    Redirect(Url),
    /// The response is the artifact; carries its content type
    Artifact(String),
}

/// Follows meta-refresh chains until a document of the expected type arrives
pub struct RedirectResolver {
    client: reqwest::Client,
    login_client: reqwest::Client,
    login_url: String,
    expected_content_type: String,
    max_hops: usize,
}

impl RedirectResolver {
    /// Create a resolver from the HTTP configuration
    ///
    /// # Errors
    /// Returns error if the HTTP clients cannot be created
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config("http", format!("failed to create HTTP client: {}", e)))?;

        let login_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::config("http", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            login_client,
            login_url: config.login_url.clone(),
            expected_content_type: config.expected_content_type.clone(),
            max_hops: config.max_redirect_hops,
        })
    }

    /// Resolve `url` to a document, following meta-refresh redirects
    ///
    /// # Errors
    /// - [`Error::Network`] on transport failures
    /// - [`Error::HttpStatus`] when the terminal response is not 200
    /// - [`Error::Protocol`] for a missing directive, the wrong content type,
    ///   an unusable redirect target, or too many hops
    pub async fn resolve(&self, url: &str) -> Result<Artifact> {
        let start = Url::parse(url)
            .map_err(|e| Error::Parse(format!("invalid document URL '{}': {}", url, e)))?;
        let mut session = RedirectSession::new(start);

        loop {
            tracing::debug!(target_url = %session.target, hops = session.hops, "Fetching");

            let mut request = self.client.get(session.target.clone());
            if let Some(cookie) = &session.cookie {
                request = request.header(COOKIE, cookie.as_str());
            }
            let response = request.send().await?;

            let status = response.status().as_u16();
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;

            match classify(
                status,
                &final_url,
                content_type.as_deref(),
                &body,
                &self.expected_content_type,
            )? {
                Transition::Redirect(next) => {
                    if session.hops >= self.max_hops {
                        return Err(ProtocolError::TooManyRedirects {
                            url: url.to_string(),
                            limit: self.max_hops,
                        }
                        .into());
                    }
                    tracing::debug!(from = %final_url, to = %next, "Following meta refresh");
                    session.hops += 1;
                    session.cookie = Some(self.session_cookie().await?);
                    session.target = next;
                }
                Transition::Artifact(content_type) => {
                    tracing::info!(
                        url = %final_url,
                        content_type = %content_type,
                        hops = session.hops,
                        bytes = body.len(),
                        "Document resolved"
                    );
                    return Ok(Artifact {
                        url: final_url,
                        content_type,
                        bytes: body.to_vec(),
                    });
                }
            }
        }
    }

    /// Log in and return the cookie header handed out by the login endpoint
    ///
    /// The login response is never followed.
    ///
    /// # Errors
    /// - [`Error::HttpStatus`] when the login answers with neither 2xx nor 3xx
    /// - [`ProtocolError::MissingSessionCookie`] when it sets no cookies
    pub async fn session_cookie(&self) -> Result<String> {
        let response = self.login_client.get(&self.login_url).send().await?;

        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(Error::HttpStatus {
                url: self.login_url.clone(),
                status: status.as_u16(),
            });
        }

        cookie_header(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        )
        .ok_or_else(|| {
            ProtocolError::MissingSessionCookie {
                url: self.login_url.clone(),
            }
            .into()
        })
    }
}

/// Decide what a single response means for the redirect chain
///
/// A web page (declared or sniffed) holding a refresh directive with a URL is
/// a redirect, regardless of status. Otherwise the response is terminal: it
/// succeeds only with status 200 and a content type whose media-type essence
/// equals `expected`. Parameters and letter case are ignored, so
/// `Application/PDF; qs=0.9` satisfies `application/pdf`. A web page without
/// any refresh directive is the host's "document not available" placeholder.
///
/// # Errors
/// Returns the terminal failure for everything that is neither a redirect nor
/// the expected artifact.
pub fn classify(
    status: u16,
    url: &Url,
    content_type: Option<&str>,
    body: &[u8],
    expected: &str,
) -> Result<Transition> {
    let web_page = is_web_page(content_type, body);

    let mut directive_found = false;
    if web_page {
        let text = String::from_utf8_lossy(body);
        if let Some(content) = find_meta_refresh(&text) {
            directive_found = true;
            if let Some(next) = parse_refresh_target(&content, url)? {
                return Ok(Transition::Redirect(next));
            }
        }
    }

    if status != 200 {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    if web_page && !directive_found {
        return Err(ProtocolError::MissingRedirect {
            url: url.to_string(),
        }
        .into());
    }

    let found = content_type.unwrap_or_default();
    if media_type(found) != media_type(expected) {
        return Err(ProtocolError::WrongContentType {
            url: url.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
        .into());
    }

    Ok(Transition::Artifact(found.to_string()))
}

/// `content` attribute of the first `<meta http-equiv="refresh">`
///
/// The attribute value is compared case-insensitively.
pub fn find_meta_refresh(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[http-equiv]").ok()?;
    document
        .select(&selector)
        .find(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

/// Resolve the target of a refresh directive such as `1; URL=/tmp/x.html`
///
/// Relative targets are joined onto `base`, the URL of the response that
/// carried the directive. `Ok(None)` when the directive has no `URL=` part.
///
/// # Errors
/// [`ProtocolError::InvalidRedirect`] when the target cannot be joined.
pub fn parse_refresh_target(content: &str, base: &Url) -> Result<Option<Url>> {
    let Some((_delay, rest)) = content.split_once(';') else {
        return Ok(None);
    };
    let rest = rest.trim();
    let Some(target) = rest
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("url="))
        .and_then(|_| rest.get(4..))
    else {
        return Ok(None);
    };
    let target = target.trim().trim_matches(|c| c == '\'' || c == '"');
    if target.is_empty() {
        return Ok(None);
    }

    base.join(target).map(Some).map_err(|e| {
        ProtocolError::InvalidRedirect {
            url: base.to_string(),
            target: target.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Build a `Cookie` header value from `Set-Cookie` header values
///
/// Only the `name=value` pair of each cookie is kept; attributes are dropped.
pub fn cookie_header<'a>(set_cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let header: String = set_cookies
        .into_iter()
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(|pair| format!("{};", pair))
        .collect();

    if header.is_empty() { None } else { Some(header) }
}

/// Lower-cased media-type essence (`text/html; charset=utf-8` → `text/html`)
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Declared HTML, or undeclared bytes that look like markup
fn is_web_page(content_type: Option<&str>, body: &[u8]) -> bool {
    let declared = content_type.map(media_type).unwrap_or_default();
    if declared == "text/html" || declared == "application/xhtml+xml" {
        return true;
    }
    if !declared.is_empty() && declared != "text/plain" && declared != "application/octet-stream" {
        return false;
    }
    sniff_html(body)
}

fn sniff_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(512)];
    if head.starts_with(b"%PDF-") {
        return false;
    }
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start().to_ascii_lowercase();
    ["<!doctype html", "<html", "<head", "<meta", "<body"]
        .iter()
        .any(|prefix| text.starts_with(prefix))
}
