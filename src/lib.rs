pub mod auth;
pub mod config;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod http_client;
pub mod logger;
pub mod result_sink;
pub mod retry;
pub mod search_engine;
pub mod session_store;
pub mod session_validator;
pub mod simple_search;

#[cfg(test)]
mod test_support;

// Exporting types for convenience
pub use auth::{Authenticator, Credentials, Prompter, StdinPrompter};
pub use config::{Config, Endpoints, Verbosity};
pub use error::{Error, Result};
pub use extractor::{Profile, ResultPage};
pub use geo::{GeoCatalog, GeoUpdater};
pub use http_client::{HttpClient, HttpResponse, Transport};
pub use search_engine::{GeoFilter, SearchEngine, SearchQuery, SearchSummary};
pub use session_store::{Session, SessionStore};
pub use session_validator::{SessionStatus, SessionValidator};
pub use simple_search::SimpleSearch;
