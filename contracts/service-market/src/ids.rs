//! Request context and request identities.
//!
//! A request context ID is the 32 byte hash of the originating transaction followed by the
//! big endian index of the message within that transaction. A request ID extends the context
//! ID by the batch counter, the request height and the position of the request in its batch,
//! which makes it splittable into its components without any storage lookup.

use cosmwasm_std::Addr;
use sha2::{Digest, Sha256};

use crate::error::ContractError;

pub const REQUEST_CONTEXT_ID_LEN: usize = 40;
pub const REQUEST_ID_LEN: usize = REQUEST_CONTEXT_ID_LEN + 8 + 8 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdParts {
    pub request_context_id: Vec<u8>,
    pub batch_counter: u64,
    pub request_height: u64,
    pub batch_request_index: u16,
}

/// CosmWasm does not expose the hash of the current transaction. This derives a value with the
/// same uniqueness properties from the position of the transaction in the chain.
pub fn derive_tx_hash(chain_id: &str, height: u64, tx_index: u32, sender: &Addr) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((chain_id.len() as u64).to_be_bytes());
    hasher.update(chain_id.as_bytes());
    hasher.update(height.to_be_bytes());
    hasher.update(tx_index.to_be_bytes());
    hasher.update(sender.as_bytes());
    hasher.finalize().into()
}

pub fn generate_request_context_id(tx_hash: &[u8; 32], msg_index: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(REQUEST_CONTEXT_ID_LEN);
    out.extend_from_slice(tx_hash);
    out.extend_from_slice(&msg_index.to_be_bytes());
    out
}

/// Splits a request context ID into transaction hash and message index
pub fn split_request_context_id(id: &[u8]) -> Result<([u8; 32], u64), ContractError> {
    if id.len() != REQUEST_CONTEXT_ID_LEN {
        return Err(ContractError::InvalidRequestContextId);
    }
    let (tx_hash, msg_index) = id.split_at(32);
    Ok((to_array(tx_hash)?, u64::from_be_bytes(to_array(msg_index)?)))
}

pub fn generate_request_id(
    request_context_id: &[u8],
    batch_counter: u64,
    request_height: u64,
    batch_request_index: u16,
) -> Result<Vec<u8>, ContractError> {
    if request_context_id.len() != REQUEST_CONTEXT_ID_LEN {
        return Err(ContractError::InvalidRequestContextId);
    }
    let mut out = Vec::with_capacity(REQUEST_ID_LEN);
    out.extend_from_slice(request_context_id);
    out.extend_from_slice(&batch_counter.to_be_bytes());
    out.extend_from_slice(&request_height.to_be_bytes());
    out.extend_from_slice(&batch_request_index.to_be_bytes());
    Ok(out)
}

pub fn split_request_id(id: &[u8]) -> Result<RequestIdParts, ContractError> {
    if id.len() != REQUEST_ID_LEN {
        return Err(ContractError::InvalidRequestId);
    }
    let (request_context_id, rest) = id.split_at(REQUEST_CONTEXT_ID_LEN);
    let (batch_counter, rest) = rest.split_at(8);
    let (request_height, batch_request_index) = rest.split_at(8);
    Ok(RequestIdParts {
        request_context_id: request_context_id.to_vec(),
        batch_counter: u64::from_be_bytes(to_array(batch_counter)?),
        request_height: u64::from_be_bytes(to_array(request_height)?),
        batch_request_index: u16::from_be_bytes(to_array(batch_request_index)?),
    })
}

fn to_array<const N: usize>(data: &[u8]) -> Result<[u8; N], ContractError> {
    data.try_into().map_err(|_| ContractError::InvalidRequestId)
}
