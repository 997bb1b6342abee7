//! In-memory chain for tests.
//!
//! View calls are answered from a table keyed by contract and selector, or by
//! contract and full calldata when a test needs argument-specific answers.
//! Sent transactions are recorded and mined immediately with scripted logs.

use super::abi::{IWrappedNative, IERC20};
use super::{ChainClient, ChainContext, TxReceipt, TxRequest};
use crate::error::ChainError;
use crate::gas_oracle::{GasOracle, GasPolicy};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WALLET: Address = Address::repeat_byte(0xAA);

struct Scripted {
    success: bool,
    logs: Vec<Log>,
}

#[derive(Default)]
struct State {
    by_selector: HashMap<(Address, [u8; 4]), Bytes>,
    by_calldata: HashMap<(Address, Bytes), Bytes>,
    scripted: VecDeque<Scripted>,
    mined: HashMap<B256, TxReceipt>,
    receipt_delay: u32,
    sent: Vec<TxRequest>,
    native_balance: U256,
    node_gas_price: u128,
    block_number: u64,
    gas_estimate: u64,
}

pub struct MockChain {
    wallet: Address,
    state: Mutex<State>,
}

impl MockChain {
    pub fn new() -> Self {
        let state = State {
            node_gas_price: 1_000_000_000,
            block_number: 100,
            gas_estimate: 150_000,
            ..Default::default()
        };
        Self { wallet: WALLET, state: Mutex::new(state) }
    }

    /// A context with a fixed 1 gwei gas price and millisecond receipt polling.
    pub fn context(self: &Arc<Self>) -> ChainContext {
        let client: Arc<dyn ChainClient> = self.clone();
        let gas = Arc::new(GasOracle::new(GasPolicy::fixed(1_000_000_000), client.clone()));
        let mut ctx = ChainContext::new(client, gas, Duration::from_secs(5));
        ctx.poll_interval = Duration::from_millis(1);
        ctx
    }

    /// Answer every `C` call to `to` with `output`.
    pub fn on_call<C: SolCall>(&self, to: Address, output: Vec<u8>) {
        self.lock().by_selector.insert((to, C::SELECTOR), output.into());
    }

    /// Answer this exact call to `to` with `output`.
    pub fn on_exact<C: SolCall>(&self, to: Address, call: C, output: Vec<u8>) {
        self.lock().by_calldata.insert((to, call.abi_encode().into()), output.into());
    }

    /// Queue the logs of the next mined transaction.
    pub fn push_receipt(&self, logs: Vec<Log>) {
        self.lock().scripted.push_back(Scripted { success: true, logs });
    }

    pub fn push_reverted_receipt(&self) {
        self.lock().scripted.push_back(Scripted { success: false, logs: vec![] });
    }

    /// The next `polls` receipt lookups return nothing.
    pub fn delay_receipts(&self, polls: u32) {
        self.lock().receipt_delay = polls;
    }

    pub fn set_native_balance(&self, balance: U256) {
        self.lock().native_balance = balance;
    }

    pub fn set_node_gas_price(&self, wei: u128) {
        self.lock().node_gas_price = wei;
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.lock().gas_estimate = gas;
    }

    pub fn set_block_number(&self, block: u64) {
        self.lock().block_number = block;
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.lock().sent.clone()
    }

    /// Selectors of sent transactions, in order.
    pub fn sent_selectors(&self) -> Vec<[u8; 4]> {
        self.lock()
            .sent
            .iter()
            .map(|tx| {
                let mut selector = [0u8; 4];
                selector.copy_from_slice(&tx.input[..4]);
                selector
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

pub fn transfer_log(token: Address, from: Address, to: Address, value: U256) -> Log {
    Log { address: token, data: IERC20::Transfer { from, to, value }.encode_log_data() }
}

pub fn withdrawal_log(wrapped: Address, src: Address, wad: U256) -> Log {
    Log { address: wrapped, data: IWrappedNative::Withdrawal { src, wad }.encode_log_data() }
}

#[async_trait]
impl ChainClient for MockChain {
    fn wallet(&self) -> Address {
        self.wallet
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let state = self.lock();
        if let Some(output) = state.by_calldata.get(&(to, input.clone())) {
            return Ok(output.clone());
        }
        let mut selector = [0u8; 4];
        if input.len() >= 4 {
            selector.copy_from_slice(&input[..4]);
        }
        state
            .by_selector
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("execution reverted: no mock for {to} 0x{}", alloy_primitives::hex::encode(selector))))
    }

    async fn estimate_gas(&self, _to: Address, _input: Bytes, _value: U256) -> Result<u64, ChainError> {
        Ok(self.lock().gas_estimate)
    }

    async fn node_gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.lock().node_gas_price)
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256, ChainError> {
        Ok(self.lock().native_balance)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.lock().block_number)
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ChainError> {
        let mut state = self.lock();
        state.sent.push(request.clone());
        let tx = B256::from(U256::from(state.sent.len()));
        let scripted = state.scripted.pop_front().unwrap_or(Scripted { success: true, logs: vec![] });
        state.mined.insert(
            tx,
            TxReceipt {
                tx_hash: tx,
                success: scripted.success,
                gas_used: 100_000,
                effective_gas_price: request.gas_price,
                logs: scripted.logs,
            },
        );
        Ok(tx)
    }

    async fn receipt(&self, tx: B256) -> Result<Option<TxReceipt>, ChainError> {
        let mut state = self.lock();
        if state.receipt_delay > 0 {
            state.receipt_delay -= 1;
            return Ok(None);
        }
        Ok(state.mined.get(&tx).cloned())
    }
}
