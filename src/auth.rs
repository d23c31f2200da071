use crate::config::Endpoints;
use crate::error::{Error, Result};
use crate::http_client::Transport;
use crate::session_store::{Session, SessionStore};
use log::{debug, error, info};
use std::io::{self, BufRead, Write};

pub const MAX_INTERACTIVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Mailbox domain, e.g. `mail.ru` or `list.ru`.
    pub domain: String,
}

/// Source of credentials for the interactive login loop.
pub trait Prompter {
    fn credentials(&mut self) -> Result<Credentials>;
}

/// Reads credentials line by line from stdin.
pub struct StdinPrompter;

impl StdinPrompter {
    fn ask(question: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", question)?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while reading credentials",
            )));
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn credentials(&mut self) -> Result<Credentials> {
        let domain = Self::ask("Enter domain (mail.ru/list.ru/...): ")?;
        let username = Self::ask("Enter username: ")?;
        let password = Self::ask("Enter password: ")?;
        Ok(Credentials {
            username,
            password,
            domain,
        })
    }
}

pub struct Authenticator<'a, T: Transport> {
    transport: &'a T,
    store: &'a SessionStore,
    endpoints: &'a Endpoints,
}

impl<'a, T: Transport> Authenticator<'a, T> {
    pub fn new(transport: &'a T, store: &'a SessionStore, endpoints: &'a Endpoints) -> Self {
        Authenticator {
            transport,
            store,
            endpoints,
        }
    }

    /// One login attempt. The outcome is read off the redirect target only.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let form = [
            ("page", self.endpoints.auth_landing_page.as_str()),
            ("FailPage", self.endpoints.auth_fail_page.as_str()),
            ("Domain", credentials.domain.as_str()),
            ("Login", credentials.username.as_str()),
            ("Password", credentials.password.as_str()),
        ];
        let resp = self.transport.post_form(&self.endpoints.auth_url, &form)?;

        if resp.final_url == self.endpoints.auth_fail_url {
            error!("Login data incorrect");
            return Err(Error::InvalidCredentials);
        }

        let session = self.transport.export_session()?;
        self.store.save(&session)?;
        debug!("Auth success. Session saved");
        Ok(session)
    }

    /// Prompts until a login succeeds, at most [`MAX_INTERACTIVE_ATTEMPTS`] times.
    pub fn authenticate_interactive(&self, prompter: &mut dyn Prompter) -> Result<Session> {
        info!("Interactive mode");
        for attempt in 1..=MAX_INTERACTIVE_ATTEMPTS {
            let credentials = prompter.credentials()?;
            match self.authenticate(&credentials) {
                Ok(session) => {
                    info!("Auth success. Cookies saved to {:?}", self.store.path());
                    return Ok(session);
                }
                Err(Error::InvalidCredentials) => {
                    debug!("Attempt {} of {} rejected", attempt, MAX_INTERACTIVE_ATTEMPTS);
                }
                Err(e) => return Err(e),
            }
        }
        error!("{} incorrect attempts. Exit", MAX_INTERACTIVE_ATTEMPTS);
        Err(Error::AuthAttemptsExhausted {
            attempts: MAX_INTERACTIVE_ATTEMPTS,
        })
    }
}
