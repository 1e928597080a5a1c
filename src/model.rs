//! Data model for insurance transactions, sealed blocks and the in-memory ledger.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::crypto::hash_block;
use crate::error::{LedgerError, Result};

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Fixed proof stored in the genesis block.
pub const GENESIS_PROOF: u64 = 100;

/// Kind of record a transaction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyType {
    #[serde(rename = "Crop Protection")]
    CropProtection,
    #[serde(rename = "Flight Delay")]
    FlightDelay,
    #[serde(rename = "Cyber Breach")]
    CyberBreach,
    #[serde(rename = "CLAIM_PAYOUT")]
    ClaimPayout,
}

impl PolicyType {
    /// Types that can be sold as a policy.
    pub const ISSUABLE: [PolicyType; 3] = [
        PolicyType::CropProtection,
        PolicyType::FlightDelay,
        PolicyType::CyberBreach,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PolicyType::CropProtection => "Crop Protection",
            PolicyType::FlightDelay => "Flight Delay",
            PolicyType::CyberBreach => "Cyber Breach",
            PolicyType::ClaimPayout => "CLAIM_PAYOUT",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyStatus {
    Active,
    Paid,
}

/// Position of a transaction on the chain: 1-based block index, 0-based slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRef {
    pub block_index: u64,
    pub position: usize,
}

/// Closed policy record attached to every transaction.
///
/// `covers` is only present on `ClaimPayout` records and names the policy
/// the payout settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDetails {
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub status: PolicyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covers: Option<PolicyRef>,
}

impl PolicyDetails {
    /// An active insurance contract with the given coverage limit.
    pub fn policy(policy_type: PolicyType, limit: f64) -> Self {
        Self {
            policy_type,
            status: PolicyStatus::Active,
            limit: Some(limit),
            event: None,
            covers: None,
        }
    }

    /// A settled claim for `event` against the policy at `covers`.
    pub fn payout(event: impl Into<String>, covers: PolicyRef) -> Self {
        Self {
            policy_type: PolicyType::ClaimPayout,
            status: PolicyStatus::Paid,
            limit: None,
            event: Some(event.into()),
            covers: Some(covers),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            check_amount("limit", limit)?;
        }
        match self.policy_type {
            PolicyType::ClaimPayout => {
                if self.event.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    return Err(LedgerError::validation("claim payout requires an event"));
                }
            }
            _ => {
                if self.covers.is_some() {
                    return Err(LedgerError::validation(format!(
                        "{} policy cannot reference a covered policy",
                        self.policy_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Value transfer plus policy metadata. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    sender: String,
    receiver: String,
    amount: f64,
    policy_details: PolicyDetails,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        policy_details: PolicyDetails,
    ) -> Result<Self> {
        let tx = Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            policy_details,
        };
        tx.validate()?;
        Ok(tx)
    }

    fn validate(&self) -> Result<()> {
        check_party("sender", &self.sender)?;
        check_party("receiver", &self.receiver)?;
        check_amount("amount", self.amount)?;
        self.policy_details.validate()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn policy_details(&self) -> &PolicyDetails {
        &self.policy_details
    }
}

fn check_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn check_party(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Sealed batch of transactions. Its own hash is never stored; see
/// [`crate::crypto::hash_block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: String,
    transactions: Vec<Transaction>,
    proof: u64,
    previous_hash: String,
}

impl Block {
    /// 1-indexed sequential position.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// RFC3339 UTC time captured at sealing.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn proof(&self) -> u64 {
        self.proof
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }
}

/// First broken invariant found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    EmptyChain,
    BadGenesis { previous_hash: String },
    GenesisNotEmpty { transactions: usize },
    IndexGap { expected: u64, found: u64 },
    BrokenLink { index: u64, expected: String, found: String },
    /// Recomputed head hash differs from the one a snapshot was exported with.
    HeadHashMismatch { expected: String, found: String },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyChain => f.write_str("chain has no blocks"),
            Self::BadGenesis { previous_hash } => {
                write!(f, "genesis previous_hash should be {GENESIS_PREVIOUS_HASH:?}, found {previous_hash:?}")
            }
            Self::GenesisNotEmpty { transactions } => {
                write!(f, "genesis block holds {transactions} transaction(s)")
            }
            Self::IndexGap { expected, found } => {
                write!(f, "expected block index {expected}, found {found}")
            }
            Self::BrokenLink { index, expected, found } => write!(
                f,
                "block {index} previous_hash mismatch: expected {expected}, found {found}"
            ),
            Self::HeadHashMismatch { expected, found } => {
                write!(f, "head hash mismatch: expected {expected}, found {found}")
            }
        }
    }
}

/// Append-only chain plus the staging area of unsealed transactions.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            pending: Vec::new(),
        };
        ledger.push_block(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        ledger
    }

    /// Rebuild a ledger from already sealed blocks, rejecting any chain that
    /// does not verify.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        for tx in blocks.iter().flat_map(|b| b.transactions.iter()) {
            tx.validate()?;
        }
        let ledger = Self {
            chain: blocks,
            pending: Vec::new(),
        };
        match ledger.first_integrity_violation() {
            Some(violation) => Err(LedgerError::Integrity(violation)),
            None => Ok(ledger),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Transactions staged for the next block.
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn next_index(&self) -> u64 {
        (self.chain.len() as u64) + 1
    }

    /// Stage a transaction and return the index of the block it will land in.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        policy_details: PolicyDetails,
    ) -> Result<u64> {
        let tx = Transaction::new(sender, receiver, amount, policy_details)?;
        self.pending.push(tx);
        Ok(self.next_index())
    }

    /// Move all staged transactions into a new block linked to the current head.
    pub fn seal(&mut self, proof: u64) -> Result<&Block> {
        let previous_hash = hash_block(self.last_block()?);
        Ok(self.push_block(proof, previous_hash))
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(LedgerError::EmptyLedger)
    }

    pub fn verify_integrity(&self) -> bool {
        self.first_integrity_violation().is_none()
    }

    /// Walk the chain and report the first broken invariant, if any.
    pub fn first_integrity_violation(&self) -> Option<IntegrityViolation> {
        let genesis = match self.chain.first() {
            Some(b) => b,
            None => return Some(IntegrityViolation::EmptyChain),
        };
        if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Some(IntegrityViolation::BadGenesis {
                previous_hash: genesis.previous_hash.clone(),
            });
        }
        if !genesis.transactions.is_empty() {
            return Some(IntegrityViolation::GenesisNotEmpty {
                transactions: genesis.transactions.len(),
            });
        }

        for (i, block) in self.chain.iter().enumerate() {
            let expected_index = i as u64 + 1;
            if block.index != expected_index {
                return Some(IntegrityViolation::IndexGap {
                    expected: expected_index,
                    found: block.index,
                });
            }
            if i == 0 {
                continue;
            }
            let expected = hash_block(&self.chain[i - 1]);
            if block.previous_hash != expected {
                return Some(IntegrityViolation::BrokenLink {
                    index: block.index,
                    expected,
                    found: block.previous_hash.clone(),
                });
            }
        }
        None
    }

    fn push_block(&mut self, proof: u64, previous_hash: String) -> &Block {
        let block = Block {
            index: self.next_index(),
            timestamp: now_rfc3339(),
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        tracing::debug!(index = block.index, txs = block.transactions.len(), "block sealed");
        self.chain.push(block);
        &self.chain[self.chain.len() - 1]
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
