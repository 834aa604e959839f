//! Network routing
//!
//! Decides whether the privileged relay path can be used for the current slot
//! and how much to pay for it.
//!
//! The chain of custody is: current slot index → scheduled leader identity →
//! that identity's vote account → membership in the relay's validator set.
//! Any missing link means the standard route.
//!
//! ## Background refresh
//!
//! - Epoch info every `epoch_poll_ms`; a new epoch reloads the leader schedule
//! - Leader schedule, vote accounts and relay validators on slower periods
//! - Landed-tip percentiles from a websocket stream, reconnecting with backoff
//!
//! All state lives behind one [`parking_lot::Mutex`] which is never held
//! across an `.await`.

pub mod tip_stream;
pub mod validators;

use parking_lot::Mutex;
use solana_sdk::{instruction::Instruction, pubkey, pubkey::Pubkey, system_instruction};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{ChainError, ChainProvider, VoteAccountInfo};
use crate::config::JitoConfig;
use crate::metrics::metrics;
use crate::sniffer::errors::ExponentialBackoff;
use crate::tx_builder::InstructionPlan;

pub use tip_stream::TipSample;
pub use validators::ValidatorDirectory;

/// Accounts the relay accepts incentive payments on.
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Validator directory error: {0}")]
    Http(String),

    #[error("Tip stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Default)]
struct RoutingState {
    epoch: Option<u64>,
    slot_index: u64,
    /// slot index -> leader identity
    slot_leaders: HashMap<usize, String>,
    /// node identity -> vote account
    vote_accounts: HashMap<String, String>,
    /// vote accounts running the relay client
    relay_validators: HashSet<String>,
    latest_tip: Option<TipSample>,
}

pub struct RoutingManager {
    chain: Arc<dyn ChainProvider>,
    directory: ValidatorDirectory,
    config: JitoConfig,
    enabled: bool,
    state: Mutex<RoutingState>,
}

impl RoutingManager {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        config: JitoConfig,
        enabled: bool,
    ) -> Result<Self, RoutingError> {
        let directory = ValidatorDirectory::new(config.validators_url.clone())?;
        Ok(Self {
            chain,
            directory,
            config,
            enabled,
            state: Mutex::new(RoutingState::default()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the current slot's leader runs the relay client.
    pub fn is_privileged_path_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let state = self.state.lock();
        let Some(leader) = state.slot_leaders.get(&(state.slot_index as usize)) else {
            return false;
        };
        let available = state
            .vote_accounts
            .get(leader)
            .is_some_and(|vote| state.relay_validators.contains(vote));
        debug!(leader = %leader, slot_index = state.slot_index, available, "Checked relay leader");
        available
    }

    /// Lamports to attach to a privileged dispatch.
    pub fn incentive_amount(&self) -> u64 {
        let amount = match self.state.lock().latest_tip {
            Some(sample) => (sample.landed_tips_75th_percentile * 1e9) as u64,
            None => self.config.default_tip_lamports,
        };
        metrics().current_tip_lamports.set(amount as i64);
        amount
    }

    /// Incentive transfer from `payer` to a randomly chosen tip account.
    pub fn tip_instruction(&self, payer: &Pubkey) -> Instruction {
        let amount = self.incentive_amount();
        let recipient = TIP_ACCOUNTS[fastrand::usize(..TIP_ACCOUNTS.len())];
        debug!(
            lamports = amount,
            sol = amount as f64 / 1e9,
            recipient = %recipient,
            "Generating tip instruction"
        );
        system_instruction::transfer(payer, &recipient, amount)
    }

    /// Rewrite `plan` for the relay when the current leader runs it.
    pub fn route_plan(&self, plan: InstructionPlan, payer: &Pubkey) -> InstructionPlan {
        if self.is_privileged_path_available() {
            plan.into_privileged(self.tip_instruction(payer))
        } else {
            plan
        }
    }

    pub fn apply_leader_schedule(&self, schedule: HashMap<String, Vec<usize>>) {
        let slot_leaders: HashMap<usize, String> = schedule
            .into_iter()
            .flat_map(|(leader, slots)| slots.into_iter().map(move |slot| (slot, leader.clone())))
            .collect();
        debug!(slots = slot_leaders.len(), "Leader schedule loaded");
        self.state.lock().slot_leaders = slot_leaders;
    }

    pub fn apply_vote_accounts(&self, accounts: Vec<VoteAccountInfo>) {
        let mut state = self.state.lock();
        for account in accounts {
            state
                .vote_accounts
                .insert(account.node_pubkey, account.vote_pubkey);
        }
    }

    pub fn apply_relay_validators(&self, relay: HashSet<String>) {
        debug!(validators = relay.len(), "Relay validators loaded");
        self.state.lock().relay_validators = relay;
    }

    pub fn apply_tip_sample(&self, sample: TipSample) {
        self.state.lock().latest_tip = Some(sample);
    }

    /// Poll epoch info, reloading the leader schedule when the epoch turns over.
    pub async fn refresh_epoch(&self) -> Result<(), RoutingError> {
        let info = self.chain.get_epoch_info().await?;
        let epoch_changed = {
            let mut state = self.state.lock();
            state.slot_index = info.slot_index;
            state.epoch != Some(info.epoch)
        };
        if epoch_changed {
            info!(epoch = info.epoch, "New epoch, reloading leader schedule");
            self.refresh_leader_schedule().await?;
            self.state.lock().epoch = Some(info.epoch);
        }
        Ok(())
    }

    pub async fn refresh_leader_schedule(&self) -> Result<(), RoutingError> {
        let schedule = self.chain.get_leader_schedule().await?;
        self.apply_leader_schedule(schedule);
        Ok(())
    }

    pub async fn refresh_vote_accounts(&self) -> Result<(), RoutingError> {
        let accounts = self.chain.get_vote_accounts().await?;
        self.apply_vote_accounts(accounts);
        Ok(())
    }

    pub async fn refresh_relay_validators(&self) -> Result<(), RoutingError> {
        let relay = self.directory.fetch_relay_vote_accounts().await?;
        self.apply_relay_validators(relay);
        Ok(())
    }

    /// Initial fetches, then the background refresh loops and the tip stream.
    ///
    /// Any failed initial fetch is returned; later failures are only logged.
    /// A disabled manager starts nothing.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, RoutingError> {
        if !self.enabled {
            info!("Privileged routing disabled");
            return Ok(Vec::new());
        }

        let mut handles = Vec::with_capacity(5);

        let this = self.clone();
        let backoff = ExponentialBackoff::new(
            self.config.stream_initial_backoff_ms,
            self.config.stream_max_backoff_ms,
        );
        handles.push(tokio::spawn(tip_stream::follow(
            self.config.tip_stream_url.clone(),
            backoff,
            move |sample| this.apply_tip_sample(sample),
        )));

        let initial = async {
            self.refresh_relay_validators().await?;
            self.refresh_vote_accounts().await?;
            self.refresh_epoch().await
        };
        if let Err(e) = initial.await {
            for handle in &handles {
                handle.abort();
            }
            return Err(e);
        }

        let c = &self.config;
        handles.push(self.spawn_refresh(
            "epoch",
            Duration::from_millis(c.epoch_poll_ms),
            |this| async move { this.refresh_epoch().await },
        ));
        handles.push(self.spawn_refresh(
            "leader schedule",
            Duration::from_secs(c.leader_schedule_refresh_secs),
            |this| async move { this.refresh_leader_schedule().await },
        ));
        handles.push(self.spawn_refresh(
            "relay validators",
            Duration::from_secs(c.validators_refresh_secs),
            |this| async move { this.refresh_relay_validators().await },
        ));
        handles.push(self.spawn_refresh(
            "vote accounts",
            Duration::from_secs(c.vote_accounts_refresh_secs),
            |this| async move { this.refresh_vote_accounts().await },
        ));

        info!("Routing manager started");
        Ok(handles)
    }

    fn spawn_refresh<F, Fut>(self: &Arc<Self>, name: &'static str, period: Duration, f: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RoutingError>> + Send,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = f(this.clone()).await {
                    warn!(task = name, error = %e, "Routing refresh failed");
                }
            }
        })
    }
}
