use core::{future::Future, time::Duration};
use std::sync::Arc;

use compact_str::CompactString;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::{
    error::Error,
    roll::{RollNumber, YearPartition},
};

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0";
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Names of the two hidden anti-forgery inputs on the index page.
pub const CSRF_TOKEN: &str = "CSRFToken";
pub const VERIFICATION_TOKEN: &str = "RequestVerificationToken";

/// The two HTTP calls the portal protocol needs. Response bodies are
/// returned regardless of status: the portal reports failures in-band.
pub trait Transport {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, Error>> + Send;

    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

impl Transport for Client {
    async fn fetch(&self, url: &str) -> Result<String, Error> {
        Ok(self.get(url).send().await?.text().await?)
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, Error> {
        Ok(self.post(url).form(form).send().await?.text().await?)
    }
}

impl<T: Transport> Transport for Arc<T> {
    #[inline]
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, Error>> + Send {
        (**self).fetch(url)
    }

    #[inline]
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, Error>> + Send {
        (**self).post_form(url, form)
    }
}

/// Hands out one fresh transport per session. Cookies and tokens are
/// session-bound, so concurrent workers never share one.
pub trait Connect {
    type Transport: Transport;

    fn connect(&self) -> Result<Self::Transport, Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct HttpConnector {
    pub timeout: Duration,
}

impl Connect for HttpConnector {
    type Transport = Client;

    fn connect(&self) -> Result<Client, Error> {
        basic(self.timeout).map_err(Into::into)
    }
}

/// A cookie-keeping client where every call carries `timeout`.
pub fn basic(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub csrf: CompactString,
    pub verification: CompactString,
}

pub fn extract_tokens(html: &str) -> Result<Tokens, Error> {
    let document = Html::parse_document(html);
    let sel_input = Selector::parse("input").unwrap();

    let value = |name: &'static str| {
        document
            .select(&sel_input)
            .filter(|input| input.attr("name") == Some(name))
            .find_map(|input| input.attr("value"))
            .map(CompactString::from)
            .ok_or_else(|| Error::TokenNotFound(name))
    };

    Ok(Tokens {
        csrf: value(CSRF_TOKEN)?,
        verification: value(VERIFICATION_TOKEN)?,
    })
}

/// One HTTP session bound to the scheme path of a single academic year.
pub struct Session<T> {
    transport: T,
    base: String,
}

impl<T: Transport> Session<T> {
    pub fn open(transport: T, portal: &str, year: &YearPartition) -> Self {
        let base = format!(
            "{}/{}/studentresult",
            portal.trim_end_matches('/'),
            year.scheme()
        );
        Self { transport, base }
    }

    #[must_use]
    pub fn index_url(&self) -> String {
        format!("{}/index.asp", self.base)
    }

    #[must_use]
    pub fn result_url(&self) -> String {
        format!("{}/result.asp", self.base)
    }

    pub async fn index(&self) -> Result<String, Error> {
        self.transport.fetch(&self.index_url()).await
    }

    pub async fn fetch_tokens(&self) -> Result<Tokens, Error> {
        let body = self.index().await?;
        let tokens = extract_tokens(&body);
        if let Err(e) = &tokens {
            tracing::warn!(target: "session", "{}: {e}", self.base);
        }
        tokens
    }

    /// Submits `roll` with freshly fetched tokens and returns the raw response body.
    pub async fn submit(&self, roll: &RollNumber) -> Result<String, Error> {
        let Tokens { csrf, verification } = self.fetch_tokens().await?;
        let roll = roll.to_string();
        let form = [
            ("RollNumber", &*roll),
            (CSRF_TOKEN, &*csrf),
            (VERIFICATION_TOKEN, &*verification),
            ("B1", "Submit"),
        ];
        tracing::debug!(target: "session", "submitting {roll}");
        self.transport.post_form(&self.result_url(), &form).await
    }
}
