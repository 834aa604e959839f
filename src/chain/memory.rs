//! Scriptable in-memory [`ChainProvider`] for tests and dry runs
//!
//! State is seeded through the `set_*`/`add_*` methods. Subscriptions are
//! fed with [`InMemoryChain::push_log`] and [`InMemoryChain::push_account_change`];
//! dropping the returned [`Subscription`] simply stops delivery.

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    AccountChange, ChainError, ChainProvider, DecodedTransaction, EpochSnapshot, LogEvent,
    Subscription, VoteAccountInfo,
};

type Sender<T> = mpsc::UnboundedSender<Result<T, ChainError>>;

#[derive(Default)]
struct State {
    accounts: HashMap<Pubkey, Vec<u8>>,
    transactions: HashMap<Signature, DecodedTransaction>,
    /// address -> signatures, newest first
    history: HashMap<Pubkey, Vec<Signature>>,
    failing_history: HashSet<Pubkey>,
    failing_subscriptions: HashSet<Pubkey>,
    log_subscribers: Vec<Sender<LogEvent>>,
    account_subscribers: HashMap<Pubkey, Vec<Sender<AccountChange>>>,
    sent: Vec<VersionedTransaction>,
    unconfirmable: HashSet<Signature>,
    blockhash: Hash,
    epoch: Option<EpochSnapshot>,
    leader_schedule: HashMap<String, Vec<usize>>,
    vote_accounts: Vec<VoteAccountInfo>,
}

#[derive(Default)]
pub struct InMemoryChain {
    state: Mutex<State>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().accounts.insert(address, data);
    }

    /// Register `tx` and prepend it to the history of every address in `touches`.
    pub fn add_transaction(&self, tx: DecodedTransaction, touches: &[Pubkey]) {
        let mut state = self.state.lock();
        for address in touches {
            state.history.entry(*address).or_default().insert(0, tx.signature);
        }
        state.transactions.insert(tx.signature, tx);
    }

    pub fn fail_history_for(&self, address: Pubkey) {
        self.state.lock().failing_history.insert(address);
    }

    pub fn fail_subscriptions_for(&self, address: Pubkey) {
        self.state.lock().failing_subscriptions.insert(address);
    }

    /// Transactions with this signature never confirm.
    pub fn never_confirm(&self, signature: Signature) {
        self.state.lock().unconfirmable.insert(signature);
    }

    pub fn set_epoch(&self, epoch: EpochSnapshot) {
        self.state.lock().epoch = Some(epoch);
    }

    pub fn set_leader_schedule(&self, schedule: HashMap<String, Vec<usize>>) {
        self.state.lock().leader_schedule = schedule;
    }

    pub fn set_vote_accounts(&self, accounts: Vec<VoteAccountInfo>) {
        self.state.lock().vote_accounts = accounts;
    }

    pub fn push_log(&self, event: LogEvent) {
        let mut state = self.state.lock();
        state
            .log_subscribers
            .retain(|tx| tx.send(Ok(event.clone())).is_ok());
    }

    pub fn push_account_change(&self, address: &Pubkey, change: AccountChange) {
        let mut state = self.state.lock();
        if let Some(subscribers) = state.account_subscribers.get_mut(address) {
            subscribers.retain(|tx| tx.send(Ok(change)).is_ok());
        }
    }

    /// Deliver an error to every subscriber of `address`.
    pub fn break_account_stream(&self, address: &Pubkey, message: &str) {
        let mut state = self.state.lock();
        if let Some(subscribers) = state.account_subscribers.remove(address) {
            for tx in subscribers {
                let _ = tx.send(Err(ChainError::Subscription(message.to_string())));
            }
        }
    }

    pub fn account_subscriber_count(&self, address: &Pubkey) -> usize {
        self.state
            .lock()
            .account_subscribers
            .get(address)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl ChainProvider for InMemoryChain {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.state.lock().accounts.get(address).cloned())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<DecodedTransaction, ChainError> {
        self.state
            .lock()
            .transactions
            .get(signature)
            .cloned()
            .ok_or_else(|| ChainError::TransactionNotFound(signature.to_string()))
    }

    async fn get_recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<Signature>, ChainError> {
        let state = self.state.lock();
        if state.failing_history.contains(address) {
            return Err(ChainError::Rpc(format!("history unavailable for {}", address)));
        }
        Ok(state
            .history
            .get(address)
            .map(|sigs| sigs.iter().take(limit).copied().collect())
            .unwrap_or_default())
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError> {
        let signature = tx.signatures.first().copied().unwrap_or_default();
        self.state.lock().sent.push(tx.clone());
        Ok(signature)
    }

    async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<(), ChainError> {
        if self.state.lock().unconfirmable.contains(signature) {
            tokio::time::sleep(timeout).await;
            return Err(ChainError::Timeout(timeout));
        }
        Ok(())
    }

    async fn subscribe_logs(&self, _program: &Pubkey) -> Result<Subscription<LogEvent>, ChainError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().log_subscribers.push(tx);
        Ok(Subscription::from_channel(rx))
    }

    async fn subscribe_account(
        &self,
        address: &Pubkey,
    ) -> Result<Subscription<AccountChange>, ChainError> {
        let mut state = self.state.lock();
        if state.failing_subscriptions.contains(address) {
            return Err(ChainError::Subscription(format!("cannot subscribe to {}", address)));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.account_subscribers.entry(*address).or_default().push(tx);
        Ok(Subscription::from_channel(rx))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError> {
        let mut state = self.state.lock();
        if state.blockhash == Hash::default() {
            state.blockhash = Hash::new_unique();
        }
        Ok(state.blockhash)
    }

    async fn get_epoch_info(&self) -> Result<EpochSnapshot, ChainError> {
        self.state
            .lock()
            .epoch
            .ok_or_else(|| ChainError::Rpc("epoch info not set".into()))
    }

    async fn get_leader_schedule(&self) -> Result<HashMap<String, Vec<usize>>, ChainError> {
        Ok(self.state.lock().leader_schedule.clone())
    }

    async fn get_vote_accounts(&self) -> Result<Vec<VoteAccountInfo>, ChainError> {
        Ok(self.state.lock().vote_accounts.clone())
    }
}
