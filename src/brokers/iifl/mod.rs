//! IIFL Capital broker adapter

use crate::brokers::types::*;
use crate::brokers::{AuthResponse, Broker, BrokerCredentials};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::candle::RawCandle;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

/// IIFL Capital broker implementation
pub struct IiflBroker {
    client: Client,
    session_url: String,
    holdings_url: String,
    historical_data_url: String,
    contract_files_url: String,
}

impl IiflBroker {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session_url: config.session_url(),
            holdings_url: config.holdings_url(),
            historical_data_url: config.historical_data_url(),
            contract_files_url: config.contract_files_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generate checksum for IIFL session request
    fn generate_checksum(client_id: &str, auth_code: &str, app_secret: &str) -> String {
        let input = format!("{}{}{}", client_id, auth_code, app_secret);
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// IIFL expects dates like `02-jan-2025`
    fn format_date(date: NaiveDate) -> String {
        date.format("%d-%b-%Y").to_string().to_lowercase()
    }

    /// Turn non-2xx responses into broker errors carrying the response body
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Broker(format!("HTTP {}: {}", status, body.trim())))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalDataRequest {
    exchange: String,
    instrument_id: String,
    interval: String,
    from_date: String,
    to_date: String,
}

impl From<&CandleRequest> for HistoricalDataRequest {
    fn from(request: &CandleRequest) -> Self {
        Self {
            exchange: request.exchange.clone(),
            instrument_id: request.instrument_id.clone(),
            interval: request.interval.clone(),
            from_date: IiflBroker::format_date(request.from_date),
            to_date: IiflBroker::format_date(request.to_date),
        }
    }
}

/// `status` values IIFL uses for a successful call
fn status_ok(status: Option<&str>) -> bool {
    status.map_or(true, |s| {
        s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("success")
    })
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    status: Option<String>,
    message: Option<String>,
    result: Option<Vec<CandleBlock>>,
}

#[derive(Debug, Deserialize)]
struct CandleBlock {
    #[serde(default)]
    candles: Vec<RawCandle>,
}

impl CandleResponse {
    /// Candles of the first result block. A failed status or a missing result is a broker error.
    fn into_candles(self) -> Result<Vec<RawCandle>> {
        let message = self
            .message
            .unwrap_or_else(|| "Historical data response has no result".to_string());

        if !status_ok(self.status.as_deref()) {
            return Err(AppError::Broker(message));
        }

        match self.result.and_then(|blocks| blocks.into_iter().next()) {
            Some(block) => Ok(block.candles),
            None => Err(AppError::Broker(message)),
        }
    }
}

#[async_trait]
impl Broker for IiflBroker {
    fn id(&self) -> &'static str {
        "iifl"
    }

    async fn authenticate(&self, credentials: BrokerCredentials) -> Result<AuthResponse> {
        if credentials.auth_code.trim().is_empty() {
            return Err(AppError::Validation("Auth code is required".to_string()));
        }

        let checksum = Self::generate_checksum(
            &credentials.client_id,
            &credentials.auth_code,
            &credentials.app_secret,
        );

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SessionRequest {
            check_sum: String,
        }

        debug!("Requesting user session. URL: {}", self.session_url);

        let response = self
            .client
            .post(&self.session_url)
            .json(&SessionRequest { check_sum: checksum })
            .send()
            .await?;

        info!("Session request response status: {}", response.status());
        let response = Self::check_status(response).await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SessionResponse {
            user_session: Option<String>,
            message: Option<String>,
        }

        let result: SessionResponse = response.json().await?;

        match result.user_session {
            Some(token) if !token.trim().is_empty() => Ok(AuthResponse {
                auth_token: token.trim().to_string(),
            }),
            _ => Err(AppError::Auth(
                result
                    .message
                    .unwrap_or_else(|| "No userSession in session response".to_string()),
            )),
        }
    }

    async fn get_holdings(&self, auth_token: &str) -> Result<Vec<BrokerHolding>> {
        info!("Sending GET request to {}", self.holdings_url);

        let response = self
            .client
            .get(&self.holdings_url)
            .bearer_auth(auth_token)
            .send()
            .await?;

        info!("Received response with status code: {}", response.status());
        let response = Self::check_status(response).await?;

        #[derive(Deserialize)]
        struct HoldingsResponse {
            status: Option<String>,
            result: Option<Vec<BrokerHolding>>,
            message: Option<String>,
        }

        let result: HoldingsResponse = response.json().await?;

        if !status_ok(result.status.as_deref()) {
            return Err(AppError::Broker(
                result.message.unwrap_or_else(|| "Holdings request failed".to_string()),
            ));
        }

        result.result.ok_or_else(|| {
            AppError::Broker(
                result
                    .message
                    .unwrap_or_else(|| "Holdings data is not in the expected list format".to_string()),
            )
        })
    }

    async fn get_candles(&self, auth_token: &str, request: &CandleRequest) -> Result<Vec<RawCandle>> {
        let payload = HistoricalDataRequest::from(request);

        let response = self
            .client
            .post(&self.historical_data_url)
            .bearer_auth(auth_token)
            .json(&payload)
            .send()
            .await?;

        let response = Self::check_status(response).await?;

        let result: CandleResponse = response.json().await?;
        result.into_candles()
    }

    async fn download_contract_file(&self, exchange: &str) -> Result<Vec<ContractEntry>> {
        let url = format!("{}/{}.json", self.contract_files_url, exchange);
        info!("Downloading contract file {}", url);

        let response = self.client.get(&url).send().await?;
        let response = Self::check_status(response).await?;

        let entries: Vec<ContractEntry> = response.json().await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_sha256_hex() {
        let checksum = IiflBroker::generate_checksum("CLIENT", "CODE", "SECRET");
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));

        // Order of the parts matters
        assert_ne!(checksum, IiflBroker::generate_checksum("CODE", "CLIENT", "SECRET"));
    }

    #[test]
    fn test_checksum_known_value() {
        // sha256("abc")
        assert_eq!(
            IiflBroker::generate_checksum("a", "b", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_historical_payload_format() {
        let request = CandleRequest {
            exchange: "NSEEQ".to_string(),
            instrument_id: "2885".to_string(),
            interval: "1 day".to_string(),
            from_date: NaiveDate::from_ymd_opt(2023, 7, 21).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        };

        let value = serde_json::to_value(HistoricalDataRequest::from(&request)).unwrap();
        assert_eq!(value["instrumentId"], "2885");
        assert_eq!(value["fromDate"], "21-jul-2023");
        assert_eq!(value["toDate"], "18-oct-2026");
        assert_eq!(value["interval"], "1 day");
    }

    #[test]
    fn test_candle_response_reads_first_block() {
        let response: CandleResponse = serde_json::from_value(serde_json::json!({
            "status": "Ok",
            "message": "Success",
            "result": [{ "candles": [["2026-10-16T00:00:00", 1, 2, 0.5, 1.5, 100]] }]
        }))
        .unwrap();

        assert_eq!(response.into_candles().unwrap().len(), 1);
    }

    #[test]
    fn test_candle_response_without_result_is_broker_error() {
        let response: CandleResponse = serde_json::from_value(serde_json::json!({
            "status": "Ok",
            "message": "No data"
        }))
        .unwrap();

        match response.into_candles() {
            Err(AppError::Broker(msg)) => assert_eq!(msg, "No data"),
            other => panic!("expected broker error, got {:?}", other),
        }
    }

    #[test]
    fn test_candle_response_failed_status_is_broker_error() {
        let response: CandleResponse = serde_json::from_value(serde_json::json!({
            "status": "EC920",
            "message": "Invalid token",
            "result": []
        }))
        .unwrap();

        assert!(matches!(response.into_candles(), Err(AppError::Broker(_))));
    }
}
