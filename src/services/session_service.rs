//! Session Service
//!
//! Exchanges an auth code for a broker session token and keeps the token on
//! disk for the rest of the trading day.

use crate::brokers::BrokerCredentials;
use crate::clock::trading_day;
use crate::error::{AppError, Result};
use crate::state::{AppState, BrokerSession};
use tracing::{debug, info};

/// Session service for business logic
pub struct SessionService;

impl SessionService {
    /// Get a session token.
    ///
    /// A token saved earlier today is reused as is. Otherwise the auth code
    /// given by the user (or, failing that, the one in the config) is sent to
    /// the broker and the new token is saved.
    pub async fn authenticate(state: &AppState, auth_code: Option<&str>) -> Result<String> {
        info!("SessionService::authenticate");

        let token_file = state.token_file();
        if let Some(token) = token_file.load_valid(trading_day())? {
            info!("Auth token is from today, reusing it");
            Self::store_session(state, &token);
            return Ok(token);
        }

        let auth_code = Self::resolve_auth_code(state, auth_code)?;

        let credentials = {
            let config = state.config.read();
            BrokerCredentials {
                client_id: config.client_id.clone(),
                app_secret: config.app_secret.clone(),
                auth_code,
            }
        };

        let response = state.broker.authenticate(credentials).await?;
        token_file.save(&response.auth_token)?;
        Self::store_session(state, &response.auth_token);

        Ok(response.auth_token)
    }

    /// Token for the stages after Authenticate.
    ///
    /// Uses the in-memory session when there is one, else today's token file.
    pub fn current_token(state: &AppState) -> Result<String> {
        if let Some(session) = state.get_broker_session() {
            return Ok(session.auth_token);
        }

        match state.token_file().load_valid(trading_day())? {
            Some(token) => {
                Self::store_session(state, &token);
                Ok(token)
            }
            None => Err(AppError::Auth(
                "No session token for today. Please get a session first.".to_string(),
            )),
        }
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    /// User-supplied code first (saved to config when new), then the config's
    fn resolve_auth_code(state: &AppState, user_code: Option<&str>) -> Result<String> {
        let user_code = user_code.map(str::trim).filter(|c| !c.is_empty());

        if let Some(code) = user_code {
            let updated = {
                let mut config = state.config.write();
                if config.auth_code.as_deref() != Some(code) {
                    config.auth_code = Some(code.to_string());
                    Some(config.clone())
                } else {
                    None
                }
            };

            if let Some(config) = updated {
                if config.source().is_some() {
                    config.save()?;
                } else {
                    debug!("Config has no source file, new auth code kept in memory only");
                }
            }

            return Ok(code.to_string());
        }

        state
            .config
            .read()
            .auth_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Auth("Auth code is required. Provide one or set AuthCode in config.".to_string())
            })
    }

    fn store_session(state: &AppState, token: &str) {
        state.set_broker_session(BrokerSession {
            broker_id: state.broker.id().to_string(),
            auth_token: token.to_string(),
            authenticated_at: chrono::Utc::now(),
        });
    }
}
