//! Risk pipeline orchestrator
//!
//! Four stages run in order: Authenticate, FetchHoldings, FetchCandles and
//! ComputeRisk. The first failed stage halts the run. FetchCandles and
//! ComputeRisk never fail because of a single holding; a bad row gets safe
//! defaults and the stage carries on.

use crate::analysis::pct_change::percentage_changes;
use crate::clock::trading_day;
use crate::error::{AppError, ErrorResponse, Result};
use crate::services::{HistoryService, HoldingsService, RiskService, SessionService, SymbolService};
use crate::state::AppState;
use crate::storage::HoldingsStore;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Authenticate,
    FetchHoldings,
    FetchCandles,
    ComputeRisk,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Authenticate,
        Stage::FetchHoldings,
        Stage::FetchCandles,
        Stage::ComputeRisk,
    ];

    /// Prefix used in user-facing feedback
    pub fn label(self) -> &'static str {
        match self {
            Stage::Authenticate => "Session",
            Stage::FetchHoldings => "Holdings",
            Stage::FetchCandles => "Candle data",
            Stage::ComputeRisk => "ATR calculation",
        }
    }

    fn completed_state(self) -> PipelineState {
        match self {
            Stage::Authenticate => PipelineState::Authenticated,
            Stage::FetchHoldings => PipelineState::HoldingsFetched,
            Stage::FetchCandles => PipelineState::CandlesFetched,
            Stage::ComputeRisk => PipelineState::RiskComputed,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Authenticate => "Authenticate",
            Stage::FetchHoldings => "FetchHoldings",
            Stage::FetchCandles => "FetchCandles",
            Stage::ComputeRisk => "ComputeRisk",
        };
        f.write_str(name)
    }
}

/// Where the pipeline currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Start,
    Authenticated,
    HoldingsFetched,
    CandlesFetched,
    RiskComputed,
    Failed(Stage),
}

/// Result of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl StageOutcome {
    fn success(stage: Stage, message: String) -> Self {
        Self {
            stage,
            ok: true,
            message,
            error: None,
        }
    }

    fn failure(stage: Stage, err: &AppError) -> Self {
        Self {
            stage,
            ok: false,
            message: err.to_string(),
            error: Some(ErrorResponse::from(err)),
        }
    }

    /// One-line feedback, e.g. `Holdings error: ...`
    pub fn feedback(&self) -> String {
        if !self.ok {
            return format!("{} error: {}", self.stage.label(), self.message);
        }
        match self.stage {
            Stage::Authenticate => format!("Session successful. {}", self.message),
            Stage::FetchHoldings => format!("Holdings fetched successfully. {}", self.message),
            Stage::FetchCandles => format!("Candle data fetched. {}", self.message),
            Stage::ComputeRisk => format!("All steps successful. {}", self.message),
        }
    }
}

/// Outcomes of one full run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub outcomes: Vec<StageOutcome>,
    pub state: PipelineState,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::RiskComputed
    }

    pub fn last(&self) -> Option<&StageOutcome> {
        self.outcomes.last()
    }
}

/// Sequential stage runner. Owns the holdings store between stages.
pub struct Pipeline {
    state: AppState,
    store: Option<HoldingsStore>,
    auth_token: Option<String>,
    status: PipelineState,
}

impl Pipeline {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            store: None,
            auth_token: None,
            status: PipelineState::Start,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> Option<&HoldingsStore> {
        self.store.as_ref()
    }

    pub fn status(&self) -> PipelineState {
        self.status
    }

    /// Run all four stages, stopping at the first failure
    pub async fn run(&mut self, auth_code: Option<&str>) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %run_id);
        let mut outcomes = Vec::with_capacity(Stage::ALL.len());

        async {
            info!("Starting pipeline run");
            for stage in Stage::ALL {
                let outcome = self.run_stage(stage, auth_code).await;
                let ok = outcome.ok;
                outcomes.push(outcome);
                if !ok {
                    break;
                }
            }
            info!("Pipeline finished in state {:?}", self.status);
        }
        .instrument(span)
        .await;

        PipelineRun {
            run_id,
            outcomes,
            state: self.status,
        }
    }

    /// Run a single stage. `auth_code` only matters to Authenticate.
    pub async fn run_stage(&mut self, stage: Stage, auth_code: Option<&str>) -> StageOutcome {
        info!("{} stage started", stage);

        let result = match stage {
            Stage::Authenticate => self.authenticate(auth_code).await,
            Stage::FetchHoldings => self.fetch_holdings().await,
            Stage::FetchCandles => self.fetch_candles().await,
            Stage::ComputeRisk => self.compute_risk(),
        };

        let outcome = match result {
            Ok(message) => {
                self.status = stage.completed_state();
                StageOutcome::success(stage, message)
            }
            Err(e) => {
                self.status = PipelineState::Failed(stage);
                StageOutcome::failure(stage, &e)
            }
        };

        if outcome.ok {
            info!("{}", outcome.feedback());
        } else {
            error!("{}", outcome.feedback());
        }
        outcome
    }

    async fn authenticate(&mut self, auth_code: Option<&str>) -> Result<String> {
        let token = SessionService::authenticate(&self.state, auth_code).await?;
        self.auth_token = Some(token);
        Ok("Session details fetched successfully".to_string())
    }

    async fn fetch_holdings(&mut self) -> Result<String> {
        let token = self.token()?;
        let store = HoldingsService::fetch_holdings(&self.state, &token).await?;
        let count = store.len();
        self.store = Some(store);
        Ok(format!(
            "Portfolio holdings fetched and saved successfully ({} holdings).",
            count
        ))
    }

    async fn fetch_candles(&mut self) -> Result<String> {
        let token = self.token()?;
        let mut store = self.take_store()?;
        let result = enrich_with_candles(&self.state, &token, &mut store).await;
        self.store = Some(store);
        result
    }

    fn compute_risk(&mut self) -> Result<String> {
        let mut store = self.take_store()?;
        let result = RiskService::compute_risk(&self.state, &mut store);
        self.store = Some(store);
        Ok(result?.to_string())
    }

    /// Session token from this run, else today's saved one
    fn token(&mut self) -> Result<String> {
        if let Some(token) = &self.auth_token {
            return Ok(token.clone());
        }
        let token = SessionService::current_token(&self.state)?;
        self.auth_token = Some(token.clone());
        Ok(token)
    }

    /// Holdings store from this run, else the one on disk
    fn take_store(&mut self) -> Result<HoldingsStore> {
        match self.store.take() {
            Some(store) => Ok(store),
            None => HoldingsService::load_holdings(&self.state),
        }
    }
}

/// Fetch candles for every holding in bounded batches and persist the store.
///
/// Each task returns its holding index; results are written back only after
/// the batch completes, so no two tasks touch the same holding.
async fn enrich_with_candles(
    state: &AppState,
    token: &str,
    store: &mut HoldingsStore,
) -> Result<String> {
    let batch_size = state.config.read().fetch.max_concurrent_requests.max(1);
    let today = trading_day();

    SymbolService::load_instruments(state);

    let mut jobs: Vec<(usize, String, String)> = Vec::new();
    let mut skipped = 0;

    for (idx, holding) in store.holdings_mut().iter_mut().enumerate() {
        let resolved = holding.nse_trading_symbol.clone().and_then(|symbol| {
            SymbolService::resolve(state, &symbol).map(|id| (symbol, id))
        });

        match resolved {
            Some((symbol, instrument_id)) => {
                holding.instrument_id = Some(instrument_id.clone());
                jobs.push((idx, symbol, instrument_id));
            }
            None => {
                warn!(
                    "Skipping holding due to missing symbol or instrumentId: {}",
                    holding.display_symbol()
                );
                holding.clear_candles();
                skipped += 1;
            }
        }
    }

    let mut fetched = 0;
    let mut failed = 0;

    for batch in jobs.chunks(batch_size) {
        let tasks = batch.iter().map(|(idx, symbol, instrument_id)| async move {
            let result =
                HistoryService::get_series(state, token, symbol, instrument_id, today).await;
            (*idx, symbol.as_str(), result)
        });

        for (idx, symbol, result) in join_all(tasks).await {
            let Some(holding) = store.holdings_mut().get_mut(idx) else {
                continue;
            };

            match result {
                Ok(series) => {
                    let changes = percentage_changes(&series);
                    info!(
                        "Successfully fetched {} candles for {}",
                        series.len(),
                        symbol
                    );
                    holding.apply_candles(series, changes);
                    fetched += 1;
                }
                Err(e) => {
                    error!("API error fetching data for {}: {}", symbol, e);
                    holding.clear_candles();
                    failed += 1;
                }
            }
        }
    }

    HoldingsService::save_holdings(state, store)?;

    Ok(format!(
        "Successfully fetched candle stick data and calculated percentage changes \
         ({} fetched, {} failed, {} skipped).",
        fetched, failed, skipped
    ))
}
