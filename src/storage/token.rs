//! Session token file
//!
//! A token is reused only on the trading day it was written. Broker session
//! tokens expire overnight, so an older file is treated as absent.

use super::write_atomic;
use crate::clock::trading_day_of_system_time;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `auth_token.txt`
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token written on `today`, if any
    pub fn load_valid(&self, today: NaiveDate) -> Result<Option<String>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Auth file {:?} does not exist", self.path);
                return Ok(None);
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let written_on = trading_day_of_system_time(metadata.modified()?);
        if written_on != today {
            info!(
                "Auth file {:?} is stale (written {}), a new token is required",
                self.path, written_on
            );
            return Ok(None);
        }

        let token = fs::read_to_string(&self.path)?.trim().to_string();
        if token.is_empty() {
            debug!("Auth file {:?} is empty", self.path);
            return Ok(None);
        }

        Ok(Some(token))
    }

    pub fn save(&self, token: &str) -> Result<()> {
        write_atomic(&self.path, token.as_bytes())?;
        info!("Auth token saved successfully to {:?}", self.path);
        Ok(())
    }
}
