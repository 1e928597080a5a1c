//! HTTP routes for issuing policies, settling claims and inspecting the chain.

use std::sync::MutexGuard;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::claims::ClaimResult;
use crate::crypto::hash_block;
use crate::model::{Block, Ledger, PolicyType};
use crate::policy::{PolicyIndex, PolicySummary};
use crate::storage;
use crate::AppState;

type ApiError = (StatusCode, String);

/// Take the ledger lock. Every mutating handler holds it for its whole
/// read-then-write sequence.
fn lock_ledger(state: &AppState) -> Result<MutexGuard<'_, Ledger>, ApiError> {
    state.ledger.lock().map_err(|_| {
        tracing::error!("ledger lock poisoned");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ledger unavailable".to_string(),
        )
    })
}

#[derive(Deserialize)]
pub struct IssueRequest {
    pub recipient: String,
    pub policy_type: PolicyType,
    pub premium: f64,
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub block_index: u64,
    pub limit: f64,
    pub block_hash: String,
}

/// POST /policies
pub async fn issue_policy(
    State(state): State<AppState>,
    Json(payload): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    let issued = state
        .engine
        .issue(&mut ledger, &payload.recipient, payload.policy_type, payload.premium)?;
    let block_hash = hash_block(ledger.last_block()?);
    Ok(Json(IssueResponse {
        block_index: issued.block_index,
        limit: issued.limit,
        block_hash,
    }))
}

/// GET /policies/:recipient
pub async fn list_policies(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
) -> Result<Json<Vec<PolicySummary>>, ApiError> {
    let ledger = lock_ledger(&state)?;
    Ok(Json(PolicyIndex::new(&ledger).policies_for(&recipient)))
}

/// One block as shown to clients, with its recomputed hash.
#[derive(Debug, Serialize)]
pub struct BlockView {
    #[serde(flatten)]
    pub block: Block,
    pub computed_hash: String,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            computed_hash: hash_block(block),
            block: block.clone(),
        }
    }
}

/// GET /chain
pub async fn chain(State(state): State<AppState>) -> Result<Json<Vec<BlockView>>, ApiError> {
    let ledger = lock_ledger(&state)?;
    Ok(Json(ledger.blocks().iter().map(BlockView::from).collect()))
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub event: String,
    pub recipient: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<ClaimResult> for ClaimResponse {
    fn from(result: ClaimResult) -> Self {
        match result {
            ClaimResult::Approved {
                payout_amount,
                block_index,
            } => Self {
                approved: true,
                amount: Some(payout_amount),
                block_index: Some(block_index),
                reason: None,
            },
            ClaimResult::Rejected { reason } => Self {
                approved: false,
                amount: None,
                block_index: None,
                reason: Some(reason),
            },
        }
    }
}

/// POST /claims
pub async fn submit_claim(
    State(state): State<AppState>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    // Unknown events never reach the ledger.
    state.engine.required_policy(&payload.event)?;
    let mut ledger = lock_ledger(&state)?;
    let result = state
        .engine
        .evaluate(&mut ledger, &payload.event, &payload.recipient)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Serialize)]
pub struct EventEntry {
    pub event: String,
    pub policy_type: PolicyType,
}

/// GET /events
pub async fn events(State(state): State<AppState>) -> Json<Vec<EventEntry>> {
    Json(
        state
            .engine
            .events()
            .map(|(event, policy_type)| EventEntry {
                event: event.to_string(),
                policy_type,
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct ChainSummary {
    pub length: usize,
    pub head_hash: String,
}

fn summarize(ledger: &Ledger) -> Result<ChainSummary, ApiError> {
    Ok(ChainSummary {
        length: ledger.len(),
        head_hash: hash_block(ledger.last_block()?),
    })
}

/// POST /reset — discard everything and start again from genesis.
pub async fn reset(State(state): State<AppState>) -> Result<Json<ChainSummary>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    let dropped = ledger.len();
    *ledger = Ledger::new();
    tracing::warn!(dropped_blocks = dropped, "ledger reset to genesis");
    Ok(Json(summarize(&ledger)?))
}

/// GET /validate — verify every link; returns { ok, errors[] }
#[derive(Debug, Serialize)]
pub struct ValidateResp {
    pub ok: bool,
    pub errors: Vec<String>,
}

pub async fn validate_chain(State(state): State<AppState>) -> Result<Json<ValidateResp>, ApiError> {
    let ledger = lock_ledger(&state)?;
    let errors: Vec<String> = ledger
        .first_integrity_violation()
        .map(|v| v.to_string())
        .into_iter()
        .collect();
    if !errors.is_empty() {
        tracing::error!(?errors, "chain integrity check failed");
    }
    Ok(Json(ValidateResp {
        ok: errors.is_empty(),
        errors,
    }))
}

type JsonBody = ([(header::HeaderName, &'static str); 1], Vec<u8>);

/// GET /export — the chain in canonical encoding.
pub async fn export(State(state): State<AppState>) -> Result<JsonBody, ApiError> {
    let snapshot = {
        let ledger = lock_ledger(&state)?;
        storage::export_chain(&ledger)?
    };
    let bytes = storage::encode_snapshot(&snapshot)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

/// POST /import — replace the chain with a verified snapshot.
pub async fn import(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChainSummary>, ApiError> {
    let restored = storage::decode_snapshot(&body)
        .and_then(storage::import_chain)
        .map_err(|e| {
            tracing::warn!(error = %e, "snapshot rejected");
            ApiError::from(e)
        })?;
    let mut ledger = lock_ledger(&state)?;
    *ledger = restored;
    tracing::info!(blocks = ledger.len(), "ledger restored from snapshot");
    Ok(Json(summarize(&ledger)?))
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
