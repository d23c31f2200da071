use crate::config::{Config, USER_AGENT as BROWSER_USER_AGENT};
use crate::error::{Error, Result};
use crate::session_store::Session;
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;
use std::sync::Arc;

/// What the client needs to know about a finished request: where redirects
/// ended up and the decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// Blocking, cookie-carrying HTTP access to the upstream service.
pub trait Transport {
    fn get(&self, url: &str) -> Result<HttpResponse>;
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse>;
    /// Snapshot of the cookies currently held.
    fn export_session(&self) -> Result<Session>;
    /// Replaces the held cookies wholesale.
    fn restore_session(&self, session: &Session) -> Result<()>;
}

pub struct HttpClient {
    client: Client,
    jar: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        let jar = Arc::new(CookieStoreMutex::default());
        let client = Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(HttpClient { client, jar })
    }

    fn finish(resp: reqwest::blocking::Response) -> Result<HttpResponse> {
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let body = resp.text()?;
        debug!("{} -> HTTP {} ({} bytes)", final_url, status, body.len());
        Ok(HttpResponse {
            final_url,
            status,
            body,
        })
    }
}

impl Transport for HttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send()?;
        Self::finish(resp)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        debug!("POST {}", url);
        let resp = self.client.post(url).form(form).send()?;
        Self::finish(resp)
    }

    fn export_session(&self) -> Result<Session> {
        let store = self
            .jar
            .lock()
            .map_err(|_| Error::SessionStore("cookie jar lock poisoned".to_string()))?;
        Ok(Session::new(store.iter_unexpired().cloned().collect()))
    }

    fn restore_session(&self, session: &Session) -> Result<()> {
        let restored = CookieStore::from_cookies(
            session.cookies().iter().cloned().map(Ok::<_, String>),
            false,
        )
        .map_err(Error::SessionStore)?;

        let mut store = self
            .jar
            .lock()
            .map_err(|_| Error::SessionStore("cookie jar lock poisoned".to_string()))?;
        *store = restored;
        debug!("Restored {} cookies", session.cookies().len());
        Ok(())
    }
}
