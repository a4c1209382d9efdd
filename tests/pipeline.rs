//! End-to-end pipeline runs against a scripted broker

use async_trait::async_trait;
use portfolio_risk_lib::brokers::types::{BrokerHolding, CandleRequest, ContractEntry};
use portfolio_risk_lib::brokers::{AuthResponse, Broker, BrokerCredentials};
use portfolio_risk_lib::config::AppConfig;
use portfolio_risk_lib::db::MemoryCandleCache;
use portfolio_risk_lib::error::{AppError, Result};
use portfolio_risk_lib::models::candle::RawCandle;
use portfolio_risk_lib::models::holding::{Action, Holding};
use portfolio_risk_lib::pipeline::{Pipeline, PipelineState, Stage};
use portfolio_risk_lib::state::AppState;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct MockBroker {
    fail_auth: bool,
    fail_holdings: bool,
    holdings: Vec<Value>,
    /// instrument id -> rows
    candles: HashMap<String, Vec<RawCandle>>,
    /// instrument ids whose candle request errors
    failing: HashSet<String>,
    /// instrument ids answered with no candles on their first request only
    empty_once: parking_lot::Mutex<HashSet<String>>,
    auth_calls: AtomicUsize,
    holdings_calls: AtomicUsize,
    candle_calls: AtomicUsize,
}

impl MockBroker {
    fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    fn holdings_calls(&self) -> usize {
        self.holdings_calls.load(Ordering::SeqCst)
    }

    fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MockBroker {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn authenticate(&self, credentials: BrokerCredentials) -> Result<AuthResponse> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth {
            return Err(AppError::Auth("Invalid auth code".to_string()));
        }
        Ok(AuthResponse {
            auth_token: format!("token-for-{}", credentials.auth_code),
        })
    }

    async fn get_holdings(&self, _auth_token: &str) -> Result<Vec<BrokerHolding>> {
        self.holdings_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_holdings {
            return Err(AppError::Broker("HTTP 503: service unavailable".to_string()));
        }
        self.holdings
            .iter()
            .map(|h| serde_json::from_value(h.clone()).map_err(AppError::from))
            .collect()
    }

    async fn get_candles(&self, _auth_token: &str, request: &CandleRequest) -> Result<Vec<RawCandle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&request.instrument_id) {
            return Err(AppError::Broker("HTTP 500: upstream timeout".to_string()));
        }
        if self.empty_once.lock().remove(&request.instrument_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .candles
            .get(&request.instrument_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_contract_file(&self, _exchange: &str) -> Result<Vec<ContractEntry>> {
        Ok(Vec::new())
    }
}

fn holding_json(symbol: &str, avg: f64, prev_close: f64) -> Value {
    json!({
        "nseTradingSymbol": symbol,
        "bseTradingSymbol": symbol.trim_end_matches("-EQ"),
        "totalQuantity": 10,
        "averageTradedPrice": avg,
        "previousDayClose": prev_close,
        "isin": "INE000000000"
    })
}

/// `n` rising bars: close = base + i, high = close + 2, low = close - 2
fn rising_rows(n: usize, base: f64) -> Vec<RawCandle> {
    (0..n)
        .map(|i| {
            let close = base + i as f64;
            vec![
                json!("2026-01-01T00:00:00"),
                json!(close),
                json!(close + 2.0),
                json!(close - 2.0),
                json!(close),
                json!(1000),
            ]
        })
        .collect()
}

fn write_config(dir: &Path, auth_code: Option<&str>) -> AppConfig {
    let mut raw = json!({
        "ClientId": "CLIENT1",
        "AppSecret": "secret",
        "IIFL_BASE_URL": "https://api.example.com/v1",
        "GET_USER_SESSION_ENDPOINT": "/getusersession",
        "HOLDINGS_ENDPOINT": "/holdings",
        "HISTORICAL_DATA_ENDPOINT": "/marketdata/historicaldata",
        "fetch": { "max_concurrent_requests": 2 },
        "paths": {
            "data_dir": dir.join("files"),
            "static_dir": dir.join("static"),
            "log_dir": dir.join("log")
        }
    });
    if let Some(code) = auth_code {
        raw["AuthCode"] = json!(code);
    }

    let path = dir.join("configs").join("config.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_string_pretty(&raw).unwrap()).unwrap();

    AppConfig::load(&path).unwrap()
}

fn write_catalog(dir: &Path, entries: Value) {
    let static_dir = dir.join("static");
    fs::create_dir_all(&static_dir).unwrap();
    fs::write(static_dir.join("NSEEQ.json"), entries.to_string()).unwrap();
}

/// Two holdings, both in the catalog, with 30 bars each
fn standard_broker() -> MockBroker {
    let mut candles = HashMap::new();
    candles.insert("101".to_string(), rising_rows(30, 100.0));
    candles.insert("202".to_string(), rising_rows(30, 50.0));

    MockBroker {
        holdings: vec![
            holding_json("ALPHA-EQ", 90.0, 128.0),
            holding_json("BETA-EQ", 40.0, 78.0),
        ],
        candles,
        ..Default::default()
    }
}

fn standard_catalog(dir: &Path) {
    write_catalog(
        dir,
        json!([
            { "tradingSymbol": "ALPHA-EQ", "instrumentId": 101, "exchange": "NSEEQ" },
            { "tradingSymbol": "BETA-EQ", "instrumentId": "202", "exchange": "NSEEQ" },
            { "tradingSymbol": "ALPHA", "instrumentId": 999, "exchange": "BSEEQ" }
        ]),
    );
}

fn pipeline_with(dir: &TempDir, broker: &Arc<MockBroker>, auth_code: Option<&str>) -> Pipeline {
    let config = write_config(dir.path(), auth_code);
    let state = AppState::with_parts(config, broker.clone(), Arc::new(MemoryCandleCache::new()));
    Pipeline::new(state)
}

fn read_report(dir: &Path) -> Vec<Holding> {
    let data = fs::read_to_string(dir.join("files").join("atr.json")).unwrap();
    serde_json::from_str(&data).unwrap()
}

#[tokio::test]
async fn test_full_run_produces_report() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("CODE-1")).await;

    assert!(run.succeeded());
    assert_eq!(run.state, PipelineState::RiskComputed);
    assert_eq!(run.outcomes.len(), 4);
    assert!(run.outcomes.iter().all(|o| o.ok));
    assert_eq!(
        run.last().unwrap().message,
        "ATR report ready. Processed 2/2 holdings."
    );
    assert_eq!(broker.candle_calls(), 2);

    let report = read_report(dir.path());
    assert_eq!(report.len(), 2);

    let alpha = &report[0];
    assert_eq!(alpha.instrument_id.as_deref(), Some("101"));
    assert_eq!(alpha.last_close, Some(129.0));
    assert_eq!(alpha.highest_price_in_period, Some(131.0));
    // Every bar's true range is 4.0 (high - low dominates the 1.0 gap to prev close)
    assert!((alpha.atr_value.unwrap() - 4.0).abs() < 1e-9);
    // 131 - 2.5 * 4 = 121, above the 90 purchase price
    assert!((alpha.trailing_stop_loss.unwrap() - 121.0).abs() < 1e-9);
    assert_eq!(alpha.action, Some(Action::Hold));
    assert_eq!(alpha.broker_fields.get("isin"), Some(&json!("INE000000000")));

    // Token and the new auth code were persisted
    let token = fs::read_to_string(dir.path().join("files").join("auth_token.txt")).unwrap();
    assert_eq!(token, "token-for-CODE-1");
    let saved: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("configs").join("config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["AuthCode"], "CODE-1");
}

#[tokio::test]
async fn test_auth_failure_stops_pipeline() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = Arc::new(MockBroker {
        fail_auth: true,
        ..standard_broker()
    });
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("BAD")).await;

    assert_eq!(run.outcomes.len(), 1);
    assert_eq!(run.state, PipelineState::Failed(Stage::Authenticate));
    assert!(run.outcomes[0].feedback().starts_with("Session error:"));
    assert_eq!(run.outcomes[0].error.as_ref().unwrap().code, "AUTH_ERROR");
    assert_eq!(broker.holdings_calls(), 0);
    assert!(!dir.path().join("files").join("auth_token.txt").exists());
}

#[tokio::test]
async fn test_missing_auth_code_fails_without_broker_call() {
    let dir = tempdir().unwrap();
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let outcome = pipeline.run_stage(Stage::Authenticate, None).await;

    assert!(!outcome.ok);
    assert_eq!(broker.auth_calls(), 0);
}

#[tokio::test]
async fn test_config_auth_code_is_used_when_none_given() {
    let dir = tempdir().unwrap();
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, Some("FROM-CONFIG"));

    let outcome = pipeline.run_stage(Stage::Authenticate, None).await;

    assert!(outcome.ok, "{}", outcome.message);
    let token = fs::read_to_string(dir.path().join("files").join("auth_token.txt")).unwrap();
    assert_eq!(token, "token-for-FROM-CONFIG");
}

#[tokio::test]
async fn test_holdings_failure_short_circuits_and_keeps_store() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let holdings_path = dir.path().join("files").join("holding.json");
    fs::create_dir_all(holdings_path.parent().unwrap()).unwrap();
    fs::write(&holdings_path, r#"{"result": []}"#).unwrap();

    let broker = Arc::new(MockBroker {
        fail_holdings: true,
        ..standard_broker()
    });
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("CODE-1")).await;

    assert_eq!(run.outcomes.len(), 2);
    assert_eq!(run.state, PipelineState::Failed(Stage::FetchHoldings));
    assert!(run.outcomes[1].feedback().starts_with("Holdings error:"));
    assert_eq!(broker.candle_calls(), 0);
    assert_eq!(fs::read_to_string(&holdings_path).unwrap(), r#"{"result": []}"#);
    assert!(!dir.path().join("files").join("atr.json").exists());
}

#[tokio::test]
async fn test_failed_candle_fetch_is_isolated_to_its_row() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let mut broker = standard_broker();
    broker.failing.insert("202".to_string());
    let broker = Arc::new(broker);
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("CODE-1")).await;

    assert!(run.succeeded());
    assert_eq!(
        run.last().unwrap().message,
        "ATR report ready. Processed 1/2 holdings."
    );

    let report = read_report(dir.path());
    let beta = &report[1];
    assert_eq!(beta.historical_data.as_ref().map(|s| s.len()), Some(0));
    assert_eq!(beta.percentage_changes.as_ref().map(|m| m.len()), Some(0));
    assert_eq!(beta.last_close, Some(78.0));
    assert_eq!(beta.highest_price_in_period, Some(78.0));
    assert_eq!(beta.atr_value, Some(0.0));
    assert_eq!(beta.trailing_stop_loss, Some(40.0));
    assert_eq!(beta.action, Some(Action::Hold));

    let alpha = &report[0];
    assert_eq!(alpha.historical_data.as_ref().map(|s| s.len()), Some(30));
    assert!(alpha.atr_value.unwrap() > 0.0);
}

#[tokio::test]
async fn test_unresolved_symbol_is_skipped() {
    let dir = tempdir().unwrap();
    write_catalog(
        dir.path(),
        json!([{ "tradingSymbol": "ALPHA-EQ", "instrumentId": 101, "exchange": "NSEEQ" }]),
    );
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("CODE-1")).await;

    assert!(run.succeeded());
    assert_eq!(broker.candle_calls(), 1);

    let store = pipeline.store().unwrap();
    let beta = store.get(1).unwrap();
    assert_eq!(beta.instrument_id, None);
    assert_eq!(beta.historical_data.as_ref().map(|s| s.len()), Some(0));
}

#[tokio::test]
async fn test_missing_catalog_degrades_every_row() {
    let dir = tempdir().unwrap();
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let run = pipeline.run(Some("CODE-1")).await;

    assert!(run.succeeded());
    assert_eq!(broker.candle_calls(), 0);
    assert_eq!(
        run.last().unwrap().message,
        "ATR report ready. Processed 0/2 holdings."
    );
}

#[tokio::test]
async fn test_compute_risk_is_idempotent() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    assert!(pipeline.run(Some("CODE-1")).await.succeeded());
    let first = fs::read_to_string(dir.path().join("files").join("atr.json")).unwrap();

    let outcome = pipeline.run_stage(Stage::ComputeRisk, None).await;
    assert!(outcome.ok);
    let second = fs::read_to_string(dir.path().join("files").join("atr.json")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stages_resume_from_disk() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = Arc::new(standard_broker());

    {
        let mut pipeline = pipeline_with(&dir, &broker, None);
        assert!(pipeline.run_stage(Stage::Authenticate, Some("CODE-1")).await.ok);
        assert!(pipeline.run_stage(Stage::FetchHoldings, None).await.ok);
    }

    // A fresh process: token and holdings come from the files written above
    let mut pipeline = pipeline_with(&dir, &broker, None);
    let candles = pipeline.run_stage(Stage::FetchCandles, None).await;
    assert!(candles.ok, "{}", candles.message);
    assert_eq!(pipeline.status(), PipelineState::CandlesFetched);

    let risk = pipeline.run_stage(Stage::ComputeRisk, None).await;
    assert!(risk.ok, "{}", risk.message);
    assert_eq!(risk.message, "ATR report ready. Processed 2/2 holdings.");

    // Authenticate again reuses today's token
    let auth = pipeline.run_stage(Stage::Authenticate, None).await;
    assert!(auth.ok);
    assert_eq!(broker.auth_calls(), 1);
}

#[tokio::test]
async fn test_compute_risk_without_holdings_file_fails() {
    let dir = tempdir().unwrap();
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    let outcome = pipeline.run_stage(Stage::ComputeRisk, None).await;

    assert!(!outcome.ok);
    assert!(outcome.feedback().starts_with("ATR calculation error:"));
    assert_eq!(pipeline.status(), PipelineState::Failed(Stage::ComputeRisk));
}

#[tokio::test]
async fn test_refetch_same_day_hits_cache() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = Arc::new(standard_broker());
    let mut pipeline = pipeline_with(&dir, &broker, None);

    assert!(pipeline.run(Some("CODE-1")).await.succeeded());
    assert_eq!(broker.candle_calls(), 2);

    assert!(pipeline.run_stage(Stage::FetchCandles, None).await.ok);
    assert_eq!(broker.candle_calls(), 2);
}

#[tokio::test]
async fn test_empty_candle_answer_is_refetched_same_day() {
    let dir = tempdir().unwrap();
    standard_catalog(dir.path());
    let broker = standard_broker();
    broker.empty_once.lock().insert("101".to_string());
    let broker = Arc::new(broker);
    let mut pipeline = pipeline_with(&dir, &broker, None);

    assert!(pipeline.run(Some("CODE-1")).await.succeeded());
    let alpha = pipeline.store().unwrap().get(0).unwrap();
    assert_eq!(alpha.historical_data.as_ref().map(|s| s.len()), Some(0));
    assert_eq!(broker.candle_calls(), 2);

    // Same-day re-run: BETA comes from the cache, ALPHA goes back to the broker
    assert!(pipeline.run_stage(Stage::FetchCandles, None).await.ok);
    assert_eq!(broker.candle_calls(), 3);
    let alpha = pipeline.store().unwrap().get(0).unwrap();
    assert_eq!(alpha.historical_data.as_ref().map(|s| s.len()), Some(30));
}
