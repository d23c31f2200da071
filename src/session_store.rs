use crate::error::{Error, Result};
use cookie_store::Cookie;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Authenticated cookie set. Replaced wholesale on re-authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    cookies: Vec<Cookie<'static>>,
}

impl Session {
    pub fn new(cookies: Vec<Cookie<'static>>) -> Self {
        Session { cookies }
    }

    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.value())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Session persistence on local disk.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SessionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// `Ok(None)` when no session was ever saved.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.exists() {
            debug!("No session file at {:?}", self.path);
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let session: Session = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::SessionStore(format!("failed to parse {:?}: {}", self.path, e))
        })?;
        info!("Previous session found. {} cookies loaded.", session.cookies.len());
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())?;
        debug!("Session saved to {:?}", self.path);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
