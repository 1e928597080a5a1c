//! Policy issuance and automated claim settlement.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::model::{Ledger, PolicyDetails, PolicyType};
use crate::policy::PolicyIndex;

/// Oracle events the engine can settle, and the policy type each requires.
pub const EVENT_TABLE: [(&str, PolicyType); 3] = [
    ("Major Drought", PolicyType::CropProtection),
    ("Flight Cancelled", PolicyType::FlightDelay),
    ("Data Leak", PolicyType::CyberBreach),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimResult {
    Approved { payout_amount: f64, block_index: u64 },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issued {
    pub block_index: u64,
    pub limit: f64,
}

#[derive(Debug, Clone)]
pub struct ClaimEngine {
    events: BTreeMap<String, PolicyType>,
    pool_account: String,
    min_premium: f64,
    coverage_multiplier: f64,
    default_payout: f64,
    issue_proof: u64,
    claim_proof: u64,
}

impl ClaimEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            events: EVENT_TABLE
                .iter()
                .map(|(event, policy_type)| (event.to_string(), *policy_type))
                .collect(),
            pool_account: config.pool_account.clone(),
            min_premium: config.min_premium,
            coverage_multiplier: config.coverage_multiplier,
            default_payout: config.default_payout,
            issue_proof: config.issue_proof,
            claim_proof: config.claim_proof,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, PolicyType)> {
        self.events.iter().map(|(event, ty)| (event.as_str(), *ty))
    }

    pub fn required_policy(&self, event: &str) -> Result<PolicyType> {
        self.events
            .get(event)
            .copied()
            .ok_or_else(|| LedgerError::UnrecognizedEvent(event.to_string()))
    }

    /// Record a new Active policy for `recipient` and seal it into its own block.
    ///
    /// Coverage limit is `premium * coverage_multiplier`.
    pub fn issue(
        &self,
        ledger: &mut Ledger,
        recipient: &str,
        policy_type: PolicyType,
        premium: f64,
    ) -> Result<Issued> {
        if !PolicyType::ISSUABLE.contains(&policy_type) {
            return Err(LedgerError::validation("claim payouts cannot be issued as policies"));
        }
        if !premium.is_finite() || premium < self.min_premium {
            return Err(LedgerError::validation(format!(
                "premium must be at least {}, got {premium}",
                self.min_premium
            )));
        }
        ensure_idle(ledger)?;

        let limit = premium * self.coverage_multiplier;
        let block_index = ledger.add_transaction(
            self.pool_account.as_str(),
            recipient,
            premium,
            PolicyDetails::policy(policy_type, limit),
        )?;
        let block = ledger.seal(self.issue_proof)?;

        tracing::info!(
            recipient,
            %policy_type,
            premium,
            limit,
            block_index,
            sealed_at = block.timestamp(),
            proof = block.proof(),
            "policy issued"
        );
        Ok(Issued { block_index, limit })
    }

    /// Settle `event` for `recipient` against the oldest unsettled Active
    /// policy of the required type.
    ///
    /// On approval a payout is staged and sealed in one step under the
    /// caller's exclusive borrow. Rejections and errors leave the ledger
    /// untouched.
    pub fn evaluate(&self, ledger: &mut Ledger, event: &str, recipient: &str) -> Result<ClaimResult> {
        let required = self.required_policy(event)?;
        if recipient.trim().is_empty() {
            return Err(LedgerError::validation("recipient is required"));
        }
        ensure_idle(ledger)?;

        let matched = PolicyIndex::new(ledger)
            .find_claimable_policy(recipient, required)
            .map(|m| (m.at, m.transaction.policy_details().limit));

        let Some((covers, limit)) = matched else {
            let reason = format!(
                "{recipient} does not have an active, unsettled '{required}' policy for '{event}'"
            );
            tracing::info!(recipient, event, "claim rejected");
            return Ok(ClaimResult::Rejected { reason });
        };

        let payout_amount = limit.unwrap_or(self.default_payout);
        let block_index = ledger.add_transaction(
            self.pool_account.as_str(),
            recipient,
            payout_amount,
            PolicyDetails::payout(event, covers),
        )?;
        let block = ledger.seal(self.claim_proof)?;

        tracing::info!(
            recipient,
            event,
            payout_amount,
            block_index,
            covered_block = covers.block_index,
            sealed_at = block.timestamp(),
            "claim approved"
        );
        Ok(ClaimResult::Approved {
            payout_amount,
            block_index,
        })
    }
}

/// Composite operations seal immediately, so they refuse to sweep up
/// transactions someone else staged. Also surfaces `EmptyLedger` before
/// anything is staged.
fn ensure_idle(ledger: &Ledger) -> Result<()> {
    ledger.last_block()?;
    if !ledger.pending().is_empty() {
        return Err(LedgerError::validation(format!(
            "{} unsealed transaction(s) pending",
            ledger.pending().len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolicyStatus;

    fn engine() -> ClaimEngine {
        ClaimEngine::new(&Config::default())
    }

    #[test]
    fn event_table_lookup() {
        let engine = engine();
        assert_eq!(engine.required_policy("Major Drought").unwrap(), PolicyType::CropProtection);
        assert_eq!(engine.required_policy("Flight Cancelled").unwrap(), PolicyType::FlightDelay);
        assert_eq!(engine.required_policy("Data Leak").unwrap(), PolicyType::CyberBreach);
        assert!(matches!(
            engine.required_policy("Meteor Strike"),
            Err(LedgerError::UnrecognizedEvent(e)) if e == "Meteor Strike"
        ));
        assert_eq!(engine.events().count(), 3);
    }

    #[test]
    fn issue_seals_policy_block() {
        let engine = engine();
        let mut ledger = Ledger::new();
        let issued = engine
            .issue(&mut ledger, "Alice", PolicyType::CropProtection, 100.0)
            .unwrap();
        assert_eq!(issued, Issued { block_index: 2, limit: 1000.0 });
        assert_eq!(ledger.len(), 2);

        let block = ledger.last_block().unwrap();
        assert_eq!(block.proof(), 200);
        let tx = &block.transactions()[0];
        assert_eq!(tx.sender(), "Insurance_Pool");
        assert_eq!(tx.receiver(), "Alice");
        assert_eq!(tx.amount(), 100.0);
        assert_eq!(tx.policy_details().status, PolicyStatus::Active);
        assert_eq!(tx.policy_details().limit, Some(1000.0));
    }

    #[test]
    fn issue_rejects_bad_requests() {
        let engine = engine();
        let mut ledger = Ledger::new();
        for (recipient, ty, premium) in [
            ("Alice", PolicyType::CropProtection, 10.0),
            ("Alice", PolicyType::CropProtection, f64::INFINITY),
            ("", PolicyType::FlightDelay, 100.0),
            ("Alice", PolicyType::ClaimPayout, 100.0),
        ] {
            let err = engine.issue(&mut ledger, recipient, ty, premium).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "{recipient} {ty} {premium}");
        }
        assert_eq!(ledger.len(), 1);
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn claim_approved_for_matching_policy() {
        let engine = engine();
        let mut ledger = Ledger::new();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CropProtection, 100.0)
            .unwrap();
        let before = ledger.len();

        let result = engine.evaluate(&mut ledger, "Major Drought", "Alice").unwrap();
        assert_eq!(
            result,
            ClaimResult::Approved {
                payout_amount: 1000.0,
                block_index: 3
            }
        );
        assert_eq!(ledger.len(), before + 1);
        assert!(ledger.verify_integrity());

        let block = ledger.last_block().unwrap();
        assert_eq!(block.proof(), 300);
        let tx = &block.transactions()[0];
        assert_eq!(tx.receiver(), "Alice");
        assert_eq!(tx.amount(), 1000.0);
        assert_eq!(tx.policy_details().policy_type, PolicyType::ClaimPayout);
        assert_eq!(tx.policy_details().status, PolicyStatus::Paid);
        assert_eq!(tx.policy_details().event.as_deref(), Some("Major Drought"));
    }

    #[test]
    fn claim_rejected_without_policy() {
        let engine = engine();
        let mut ledger = Ledger::new();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CropProtection, 100.0)
            .unwrap();
        let before = ledger.len();

        let result = engine.evaluate(&mut ledger, "Flight Cancelled", "Alice").unwrap();
        assert!(matches!(result, ClaimResult::Rejected { .. }));
        assert_eq!(ledger.len(), before);

        let result = engine.evaluate(&mut ledger, "Major Drought", "Bob").unwrap();
        assert!(matches!(result, ClaimResult::Rejected { .. }));
        assert_eq!(ledger.len(), before);
    }

    #[test]
    fn repeated_claim_is_rejected() {
        let engine = engine();
        let mut ledger = Ledger::new();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CropProtection, 100.0)
            .unwrap();

        let first = engine.evaluate(&mut ledger, "Major Drought", "Alice").unwrap();
        assert!(matches!(first, ClaimResult::Approved { .. }));
        let len = ledger.len();

        let second = engine.evaluate(&mut ledger, "Major Drought", "Alice").unwrap();
        assert!(matches!(second, ClaimResult::Rejected { .. }));
        assert_eq!(ledger.len(), len);
    }

    #[test]
    fn second_policy_pays_after_first_is_settled() {
        let engine = engine();
        let mut ledger = Ledger::new();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CyberBreach, 50.0)
            .unwrap();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CyberBreach, 200.0)
            .unwrap();

        let first = engine.evaluate(&mut ledger, "Data Leak", "Alice").unwrap();
        let second = engine.evaluate(&mut ledger, "Data Leak", "Alice").unwrap();
        let third = engine.evaluate(&mut ledger, "Data Leak", "Alice").unwrap();
        assert!(matches!(first, ClaimResult::Approved { payout_amount, .. } if payout_amount == 500.0));
        assert!(matches!(second, ClaimResult::Approved { payout_amount, .. } if payout_amount == 2000.0));
        assert!(matches!(third, ClaimResult::Rejected { .. }));
    }

    #[test]
    fn missing_limit_pays_default() {
        let engine = engine();
        let mut ledger = Ledger::new();
        let mut details = PolicyDetails::policy(PolicyType::FlightDelay, 0.0);
        details.limit = None;
        ledger
            .add_transaction("Insurance_Pool", "Alice", 75.0, details)
            .unwrap();
        ledger.seal(200).unwrap();

        let result = engine.evaluate(&mut ledger, "Flight Cancelled", "Alice").unwrap();
        assert!(matches!(result, ClaimResult::Approved { payout_amount, .. } if payout_amount == 1000.0));
    }

    #[test]
    fn unrecognized_event_touches_nothing() {
        let engine = engine();
        let mut ledger = Ledger::new();
        let err = engine.evaluate(&mut ledger, "Volcano", "Alice").unwrap_err();
        assert!(matches!(err, LedgerError::UnrecognizedEvent(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn pending_transactions_block_composite_operations() {
        let engine = engine();
        let mut ledger = Ledger::new();
        engine
            .issue(&mut ledger, "Alice", PolicyType::CropProtection, 100.0)
            .unwrap();
        ledger
            .add_transaction(
                "Insurance_Pool",
                "Bob",
                60.0,
                PolicyDetails::policy(PolicyType::FlightDelay, 600.0),
            )
            .unwrap();

        let err = engine.evaluate(&mut ledger, "Major Drought", "Alice").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = engine
            .issue(&mut ledger, "Carol", PolicyType::CyberBreach, 100.0)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn claim_result_wire_shape() {
        let json = serde_json::to_value(ClaimResult::Approved {
            payout_amount: 1000.0,
            block_index: 3,
        })
        .unwrap();
        assert_eq!(json["outcome"], "approved");
        assert_eq!(json["block_index"], 3);
    }
}
