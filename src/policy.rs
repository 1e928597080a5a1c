//! Read-only policy queries over a ledger.
//!
//! Every lookup is a linear scan of the sealed chain in block order, then
//! transaction order. Nothing is cached: the cost is O(total transactions)
//! per query. Staged (unsealed) transactions are never visible here.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{Ledger, PolicyRef, PolicyStatus, PolicyType, Transaction};

/// A transaction found by a policy query, with its position on the chain.
#[derive(Debug, Clone, Copy)]
pub struct PolicyMatch<'a> {
    pub at: PolicyRef,
    pub transaction: &'a Transaction,
}

/// Display row for a recipient's issued policies.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub block_index: u64,
    pub position: usize,
    pub policy_type: PolicyType,
    pub status: PolicyStatus,
    pub issuer: String,
    pub premium: f64,
    pub limit: Option<f64>,
    pub settled: bool,
}

pub struct PolicyIndex<'a> {
    ledger: &'a Ledger,
}

impl<'a> PolicyIndex<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    fn entries(&self) -> impl Iterator<Item = PolicyMatch<'a>> + 'a {
        let ledger = self.ledger;
        ledger.blocks().iter().flat_map(|block| {
            block
                .transactions()
                .iter()
                .enumerate()
                .map(move |(position, transaction)| PolicyMatch {
                    at: PolicyRef {
                        block_index: block.index(),
                        position,
                    },
                    transaction,
                })
        })
    }

    fn active_matches(
        &self,
        recipient: &'a str,
        policy_type: PolicyType,
    ) -> impl Iterator<Item = PolicyMatch<'a>> + 'a {
        self.entries().filter(move |m| {
            let details = m.transaction.policy_details();
            m.transaction.receiver() == recipient
                && details.status == PolicyStatus::Active
                && details.policy_type == policy_type
        })
    }

    /// First transaction, oldest first, paying `recipient` under an Active
    /// policy of `policy_type`. Settlement is not considered.
    pub fn find_active_policy(
        &self,
        recipient: &'a str,
        policy_type: PolicyType,
    ) -> Option<PolicyMatch<'a>> {
        self.active_matches(recipient, policy_type).next()
    }

    fn transaction_at(&self, at: PolicyRef) -> Option<&'a Transaction> {
        let ledger = self.ledger;
        let slot = usize::try_from(at.block_index.checked_sub(1)?).ok()?;
        ledger.blocks().get(slot)?.transactions().get(at.position)
    }

    /// Policies that some recorded payout already covers.
    ///
    /// A payout only counts when it comes after the policy, pays the same
    /// receiver, and points at an issued policy rather than another payout.
    pub fn settled(&self) -> HashSet<PolicyRef> {
        self.entries()
            .filter_map(|m| {
                let details = m.transaction.policy_details();
                if details.policy_type != PolicyType::ClaimPayout {
                    return None;
                }
                let covers = details.covers?;
                let covered = self.transaction_at(covers)?;
                let valid = covers < m.at
                    && covered.receiver() == m.transaction.receiver()
                    && covered.policy_details().policy_type != PolicyType::ClaimPayout;
                valid.then_some(covers)
            })
            .collect()
    }

    /// Like [`find_active_policy`](Self::find_active_policy), skipping
    /// policies already settled by a payout.
    pub fn find_claimable_policy(
        &self,
        recipient: &'a str,
        policy_type: PolicyType,
    ) -> Option<PolicyMatch<'a>> {
        let settled = self.settled();
        self.active_matches(recipient, policy_type)
            .find(|m| !settled.contains(&m.at))
    }

    /// Every policy issued to `recipient`, payouts excluded, in chain order.
    pub fn policies_for(&self, recipient: &str) -> Vec<PolicySummary> {
        let settled = self.settled();
        self.entries()
            .filter(|m| {
                m.transaction.receiver() == recipient
                    && m.transaction.policy_details().policy_type != PolicyType::ClaimPayout
            })
            .map(|m| {
                let details = m.transaction.policy_details();
                PolicySummary {
                    block_index: m.at.block_index,
                    position: m.at.position,
                    policy_type: details.policy_type,
                    status: details.status,
                    issuer: m.transaction.sender().to_string(),
                    premium: m.transaction.amount(),
                    limit: details.limit,
                    settled: settled.contains(&m.at),
                }
            })
            .collect()
    }
}
