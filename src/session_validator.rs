use crate::auth::{Authenticator, Prompter};
use crate::config::Endpoints;
use crate::error::Result;
use crate::http_client::Transport;
use crate::search_engine::{SearchEngine, SearchQuery};
use crate::session_store::{Session, SessionStore};
use log::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// The auth page bounced the stored cookies to the login form.
    LoginRequired,
    /// Cookies were accepted but the search API refuses them.
    AccessDenied,
}

/// Outcome of checking a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Missing,
    Valid,
    Invalid(InvalidReason),
    /// The auth page redirected somewhere we do not know.
    Unrecognized { landing_url: String },
}

impl SessionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionStatus::Valid)
    }
}

pub struct SessionValidator<'a, T: Transport> {
    transport: &'a T,
    store: &'a SessionStore,
    endpoints: &'a Endpoints,
    engine: &'a SearchEngine<'a, T>,
}

impl<'a, T: Transport> SessionValidator<'a, T> {
    pub fn new(
        transport: &'a T,
        store: &'a SessionStore,
        endpoints: &'a Endpoints,
        engine: &'a SearchEngine<'a, T>,
    ) -> Self {
        SessionValidator {
            transport,
            store,
            endpoints,
            engine,
        }
    }

    /// Restores the stored session into the transport and probes it.
    pub fn check(&self) -> Result<SessionStatus> {
        let session = match self.store.load()? {
            Some(session) => session,
            None => return Ok(SessionStatus::Missing),
        };
        self.transport.restore_session(&session)?;
        self.probe()
    }

    /// Probes whatever session the transport currently holds.
    pub fn probe(&self) -> Result<SessionStatus> {
        let landing = self.transport.get(&self.endpoints.auth_url)?;
        debug!("Auth check landed on {}", landing.final_url);

        if landing.final_url == self.endpoints.inbox_url {
            let probe = SearchQuery::new(self.endpoints.probe_query.as_str());
            let payload = self.engine.fetch_payload(&probe, 0)?;
            if payload.as_str() == Some(self.endpoints.denied_payload.as_str()) {
                return Ok(SessionStatus::Invalid(InvalidReason::AccessDenied));
            }
            Ok(SessionStatus::Valid)
        } else if landing.final_url == self.endpoints.login_fail_url {
            Ok(SessionStatus::Invalid(InvalidReason::LoginRequired))
        } else {
            Ok(SessionStatus::Unrecognized {
                landing_url: landing.final_url,
            })
        }
    }

    /// Leaves the transport holding a working session, logging in
    /// interactively when the stored one is missing or not accepted.
    pub fn ensure(
        &self,
        authenticator: &Authenticator<'_, T>,
        prompter: &mut dyn Prompter,
    ) -> Result<SessionStatus> {
        let status = self.check()?;
        match &status {
            SessionStatus::Valid => {
                info!("Auth check passed");
                return Ok(status);
            }
            SessionStatus::Missing => debug!("Previous session not found. Authenticate..."),
            SessionStatus::Invalid(InvalidReason::AccessDenied) => {
                error!("Auth check passed, but api deny your request. Authenticate...")
            }
            SessionStatus::Invalid(InvalidReason::LoginRequired) => {
                error!("Auth check failed. Authenticate...")
            }
            SessionStatus::Unrecognized { landing_url } => {
                error!("Auth check returned unknown response ({}). Authenticate...", landing_url)
            }
        }

        self.transport.restore_session(&Session::default())?;
        authenticator.authenticate_interactive(prompter)?;
        Ok(status)
    }
}
