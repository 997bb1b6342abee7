//! Receipt inspection.
//!
//! Amounts realised by a transaction are read from the token events in its
//! receipt rather than from pre-trade quotes.

use super::abi::{IWrappedNative, IERC20};
use super::TxReceipt;
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolEvent;

/// A decoded ERC-20 `Transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// All fungible-token transfers in the receipt, in log order.
pub fn transfers(receipt: &TxReceipt) -> Vec<TokenTransfer> {
    receipt
        .logs
        .iter()
        .filter(|log| log.topics().first() == Some(&IERC20::Transfer::SIGNATURE_HASH))
        .filter_map(|log| {
            IERC20::Transfer::decode_log_data(&log.data).ok().map(|event| TokenTransfer {
                token: log.address,
                from: event.from,
                to: event.to,
                value: event.value,
            })
        })
        .collect()
}

/// Total of `token` that arrived at `wallet`.
pub fn received(receipt: &TxReceipt, token: Address, wallet: Address) -> U256 {
    transfers(receipt)
        .into_iter()
        .filter(|t| t.token == token && t.to == wallet)
        .fold(U256::ZERO, |acc, t| acc.saturating_add(t.value))
}

/// Total of `token` that left `wallet`.
pub fn sent(receipt: &TxReceipt, token: Address, wallet: Address) -> U256 {
    transfers(receipt)
        .into_iter()
        .filter(|t| t.token == token && t.from == wallet)
        .fold(U256::ZERO, |acc, t| acc.saturating_add(t.value))
}

/// Wrapped native that was unwrapped to the native coin in this receipt.
///
/// Covers both wrapped-native flavours: a burn `Transfer` to the zero
/// address, or a `Withdrawal` event.
pub fn unwrapped_native(receipt: &TxReceipt, wrapped_native: Address) -> U256 {
    let burned = transfers(receipt)
        .into_iter()
        .filter(|t| t.token == wrapped_native && t.to == Address::ZERO)
        .fold(U256::ZERO, |acc, t| acc.saturating_add(t.value));

    let withdrawn = receipt
        .logs
        .iter()
        .filter(|log| log.address == wrapped_native)
        .filter(|log| log.topics().first() == Some(&IWrappedNative::Withdrawal::SIGNATURE_HASH))
        .filter_map(|log| IWrappedNative::Withdrawal::decode_log_data(&log.data).ok())
        .fold(U256::ZERO, |acc, event| acc.saturating_add(event.wad));

    burned.saturating_add(withdrawn)
}
