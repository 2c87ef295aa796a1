//! HTTP retrieval of source files.
//!
//! Government sites often serve broken certificate chains, so certificate
//! verification is turned off. Anyone able to intercept the traffic can
//! substitute the downloaded files.

use crate::error::CrawlerError;
use crate::error::Result;
use clap::crate_name;
use clap::crate_version;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_DISPOSITION;
use std::fmt::Display;
use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use tracing::trace;
use url::Url;

static UTF8_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)UTF-8''([^;]+)").expect("Hardcode regex pattern"));
static QUOTED_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).expect("Hardcode regex pattern"));
static PLAIN_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"filename=([^;\s]+)").expect("Hardcode regex pattern"));

/// A response body ready to be copied, with the file name the server suggested.
pub struct Retrieved {
    pub body: Box<dyn Read>,
    pub file_name: String,
}

pub trait Fetcher {
    fn retrieve(&self, url: &str) -> Result<Retrieved>;
}

fn retrieval_error(url: &str, cause: impl Display) -> CrawlerError {
    CrawlerError::Retrieval {
        url: url.to_owned(),
        cause: cause.to_string(),
    }
}

/// Blocking HTTP GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `timeout` bounds a whole download; `None` waits for as long as the server keeps the connection.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(format!("{}/{}", crate_name!(), crate_version!()))
            .timeout(timeout)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self))]
    fn retrieve(&self, url: &str) -> Result<Retrieved> {
        let target = Url::parse(url).map_err(|error| retrieval_error(url, error))?;
        trace!("GET {target}");
        let response = self
            .client
            .get(target)
            .send()
            .map_err(|error| retrieval_error(url, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(retrieval_error(url, format!("server answered {status}")));
        }

        let header = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .ok_or_else(|| retrieval_error(url, "no content-disposition header"))?;
        let file_name = file_name_from_disposition(&header)
            .ok_or_else(|| retrieval_error(url, format!("no file name in content-disposition '{header}'")))?;
        debug!("{url} suggests '{file_name}'");

        Ok(Retrieved {
            body: Box::new(response),
            file_name,
        })
    }
}

/// File name announced by a content-disposition header.
///
/// The header is percent-decoded first, then the RFC 5987 `UTF-8''name` form is
/// tried before `filename="name"` and finally a bare `filename=name`. Only the
/// last path component is kept.
pub fn file_name_from_disposition(header: &str) -> Option<String> {
    let decoded = percent_decode_str(header).decode_utf8_lossy();
    let captured = [&UTF8_FILE_NAME, &QUOTED_FILE_NAME, &PLAIN_FILE_NAME]
        .iter()
        .find_map(|pattern| pattern.captures(&decoded))
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().to_owned())?;

    let name = captured
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_owned()),
    }
}
