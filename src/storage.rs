//! Chain snapshots in the canonical block encoding.
//!
//! Nothing is written to disk. A snapshot is produced on request and can be
//! handed back to rebuild a ledger, which is re-verified before use.

use serde::{Deserialize, Serialize};

use crate::crypto::{canonical_encoding, hash_block};
use crate::error::{LedgerError, Result};
use crate::model::{Block, IntegrityViolation, Ledger};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Hash of the last block at export time.
    pub head_hash: String,
    pub blocks: Vec<Block>,
}

/// Capture the sealed chain. Pending transactions are not included.
pub fn export_chain(ledger: &Ledger) -> Result<Snapshot> {
    let head_hash = hash_block(ledger.last_block()?);
    Ok(Snapshot {
        head_hash,
        blocks: ledger.blocks().to_vec(),
    })
}

/// Rebuild a ledger from a snapshot, rejecting tampered or truncated chains.
pub fn import_chain(snapshot: Snapshot) -> Result<Ledger> {
    let head = snapshot
        .blocks
        .last()
        .ok_or(LedgerError::Integrity(IntegrityViolation::EmptyChain))?;
    let actual = hash_block(head);
    if actual != snapshot.head_hash {
        return Err(LedgerError::Integrity(IntegrityViolation::HeadHashMismatch {
            expected: actual,
            found: snapshot.head_hash,
        }));
    }
    Ledger::from_blocks(snapshot.blocks)
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    Ok(canonical_encoding(snapshot)?)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot> {
    Ok(serde_json::from_slice(bytes)?)
}
