//! Scripted transport shared by the unit tests.

use crate::error::{Error, Result};
use crate::http_client::{HttpResponse, Transport};
use crate::session_store::Session;
use cookie_store::Cookie;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use url::Url;

pub fn session_with(pairs: &[(&str, &str)]) -> Session {
    let url = Url::parse("https://my.mail.ru/").unwrap();
    let cookies = pairs
        .iter()
        .map(|(name, value)| {
            Cookie::parse(format!("{}={}; Domain=mail.ru; Path=/", name, value), &url)
                .unwrap()
                .into_owned()
        })
        .collect();
    Session::new(cookies)
}

pub fn ok(final_url: &str, body: &str) -> Result<HttpResponse> {
    Ok(HttpResponse {
        final_url: final_url.to_string(),
        status: 200,
        body: body.to_string(),
    })
}

pub fn network_error() -> Result<HttpResponse> {
    Err(Error::Decode("connection reset by peer".to_string()))
}

/// Serves queued responses per exact URL. Once a URL's queue is down to one
/// response, that response is repeated.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: RefCell<HashMap<String, VecDeque<Result<HttpResponse>>>>,
    requests: RefCell<Vec<String>>,
    forms: RefCell<Vec<Vec<(String, String)>>>,
    session: RefCell<Session>,
    /// Cookies the upstream hands out on a POST.
    issued: RefCell<Session>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, url: &str, response: Result<HttpResponse>) -> &Self {
        self.routes
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn issues_session(&self, session: Session) {
        *self.issued.borrow_mut() = session;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }

    pub fn forms(&self) -> Vec<Vec<(String, String)>> {
        self.forms.borrow().clone()
    }

    pub fn current_session(&self) -> Session {
        self.session.borrow().clone()
    }

    fn respond(&self, url: &str) -> Result<HttpResponse> {
        self.requests.borrow_mut().push(url.to_string());
        let mut routes = self.routes.borrow_mut();
        let queue = match routes.get_mut(url) {
            Some(queue) if !queue.is_empty() => queue,
            _ => return Err(Error::Decode(format!("no scripted response for {}", url))),
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap_or_else(network_error);
        }
        match queue.front() {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(e)) => Err(Error::Decode(e.to_string())),
            None => network_error(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        self.respond(url)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        self.forms.borrow_mut().push(
            form.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let resp = self.respond(url)?;
        *self.session.borrow_mut() = self.issued.borrow().clone();
        Ok(resp)
    }

    fn export_session(&self) -> Result<Session> {
        Ok(self.session.borrow().clone())
    }

    fn restore_session(&self, session: &Session) -> Result<()> {
        *self.session.borrow_mut() = session.clone();
        Ok(())
    }
}
