//! [`ChainProvider`] over the nonblocking Solana RPC and pubsub clients

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::{
        RpcAccountInfoConfig, RpcSendTransactionConfig, RpcSignatureSubscribeConfig,
        RpcTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter,
    },
    rpc_response::RpcSignatureResult,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    UiInstruction, UiTransactionEncoding,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::reconnect::Reconnecting;
use super::{
    AccountChange, ChainError, ChainProvider, DecodedTransaction, EpochSnapshot, LogEvent,
    Subscription, VoteAccountInfo,
};
use crate::compat;
use crate::config::RpcConfig;

pub struct SolanaChainProvider {
    rpc: Arc<RpcClient>,
    /// Extra endpoints that receive every broadcast, fire-and-forget
    send_clients: Vec<Arc<RpcClient>>,
    pubsub: Reconnecting<PubsubClient>,
    commitment: CommitmentConfig,
}

impl SolanaChainProvider {
    pub async fn connect(config: &RpcConfig) -> Result<Self, ChainError> {
        let commitment = CommitmentConfig::confirmed();
        let rpc = Arc::new(RpcClient::new_with_commitment(config.url.clone(), commitment));
        let send_clients = config
            .send_tx_urls
            .iter()
            .map(|url| Arc::new(RpcClient::new_with_commitment(url.clone(), commitment)))
            .collect();
        let ws_url = config.ws_url.clone();
        let pubsub = Reconnecting::connect(move || {
            let ws_url = ws_url.clone();
            async move {
                PubsubClient::new(&ws_url)
                    .await
                    .map_err(|e| ChainError::Subscription(format!("connect {}: {}", ws_url, e)))
            }
            .boxed()
        })
        .await?;

        Ok(Self {
            rpc,
            send_clients,
            pubsub,
            commitment,
        })
    }

    async fn await_signature(&self, signature: Signature) -> Result<(), ChainError> {
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(self.commitment),
            enable_received_notification: Some(false),
        };
        loop {
            // Subscribe before the status check so a landing in between is not missed.
            let subscription = self
                .pubsub
                .run(|client| signature_subscription(client, signature, config.clone()))
                .await?;
            let landed = self.landed_status(&signature).await;
            match wait_for_confirmation(subscription, landed).await {
                Some(outcome) => return outcome,
                None => debug!(signature = %signature, "Signature subscription closed, resubscribing"),
            }
        }
    }

    /// One-shot status lookup for a signature that may have landed before
    /// the subscription was registered.
    async fn landed_status(&self, signature: &Signature) -> Option<Result<(), ChainError>> {
        let response = match self.rpc.get_signature_statuses(&[*signature]).await {
            Ok(response) => response,
            Err(e) => {
                debug!(signature = %signature, error = %e, "Status check failed");
                return None;
            }
        };
        let status = response.value.into_iter().next().flatten()?;
        if let Some(err) = status.err {
            return Some(Err(ChainError::TransactionFailed(err.to_string())));
        }
        status.satisfies_commitment(self.commitment).then_some(Ok(()))
    }

    fn client_error(err: solana_client::client_error::ClientError) -> ChainError {
        ChainError::from_message(err.to_string())
    }
}

#[async_trait]
impl ChainProvider for SolanaChainProvider {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(Self::client_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<DecodedTransaction, ChainError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let tx = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("invalid type: null") {
                    ChainError::TransactionNotFound(signature.to_string())
                } else {
                    ChainError::from_message(message)
                }
            })?;
        decode_confirmed_transaction(*signature, tx)
    }

    async fn get_recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<Signature>, ChainError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let statuses = self
            .rpc
            .get_signatures_for_address_with_config(address, config)
            .await
            .map_err(Self::client_error)?;

        statuses
            .iter()
            .map(|status| {
                Signature::from_str(&status.signature)
                    .map_err(|e| ChainError::Decode(format!("signature {}: {}", status.signature, e)))
            })
            .collect()
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, ChainError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            ..RpcSendTransactionConfig::default()
        };

        for client in &self.send_clients {
            let client = Arc::clone(client);
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = client.send_transaction_with_config(&tx, config).await {
                    debug!(endpoint = %client.url(), error = %e, "Alternate send failed");
                }
            });
        }

        self.rpc
            .send_transaction_with_config(tx, config)
            .await
            .map_err(Self::client_error)
    }

    async fn confirm_signature(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> Result<(), ChainError> {
        tokio::time::timeout(timeout, self.await_signature(*signature))
            .await
            .map_err(|_| ChainError::Timeout(timeout))?
    }

    async fn subscribe_logs(&self, program: &Pubkey) -> Result<Subscription<LogEvent>, ChainError> {
        let filter = RpcTransactionLogsFilter::Mentions(vec![program.to_string()]);
        let config = RpcTransactionLogsConfig {
            commitment: Some(self.commitment),
        };
        self.pubsub
            .run(|client| logs_subscription(client, filter.clone(), config.clone()))
            .await
    }

    async fn subscribe_account(
        &self,
        address: &Pubkey,
    ) -> Result<Subscription<AccountChange>, ChainError> {
        let address = *address;
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(self.commitment),
            data_slice: None,
            min_context_slot: None,
        };
        self.pubsub
            .run(|client| account_subscription(client, address, config.clone()))
            .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ChainError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(Self::client_error)
    }

    async fn get_epoch_info(&self) -> Result<EpochSnapshot, ChainError> {
        let info = self.rpc.get_epoch_info().await.map_err(Self::client_error)?;
        Ok(EpochSnapshot {
            epoch: info.epoch,
            slot_index: info.slot_index,
            absolute_slot: info.absolute_slot,
        })
    }

    async fn get_leader_schedule(&self) -> Result<HashMap<String, Vec<usize>>, ChainError> {
        self.rpc
            .get_leader_schedule(None)
            .await
            .map_err(Self::client_error)?
            .ok_or_else(|| ChainError::Rpc("leader schedule unavailable".into()))
    }

    async fn get_vote_accounts(&self) -> Result<Vec<VoteAccountInfo>, ChainError> {
        let status = self
            .rpc
            .get_vote_accounts()
            .await
            .map_err(Self::client_error)?;
        Ok(status
            .current
            .into_iter()
            .chain(status.delinquent)
            .map(|account| VoteAccountInfo {
                node_pubkey: account.node_pubkey,
                vote_pubkey: account.vote_pubkey,
            })
            .collect())
    }
}

async fn logs_subscription(
    client: Arc<PubsubClient>,
    filter: RpcTransactionLogsFilter,
    config: RpcTransactionLogsConfig,
) -> Result<Subscription<LogEvent>, ChainError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let (mut stream, unsubscribe) = match client.logs_subscribe(filter, config).await {
            Ok(pair) => {
                let _ = ready_tx.send(Ok(()));
                pair
            }
            Err(e) => {
                let _ = ready_tx.send(Err(ChainError::Subscription(e.to_string())));
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                item = stream.next() => {
                    let Some(response) = item else { break };
                    let event = Signature::from_str(&response.value.signature)
                        .map(|signature| LogEvent {
                            signature,
                            logs: response.value.logs,
                            failed: response.value.err.is_some(),
                        })
                        .map_err(|e| ChainError::Decode(e.to_string()));
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            }
        }

        drop(stream);
        unsubscribe().await;
    });

    ready_rx
        .await
        .map_err(|_| ChainError::Subscription("log subscription task ended".into()))??;
    Ok(Subscription::new(event_rx, cancel_tx, task))
}

async fn account_subscription(
    client: Arc<PubsubClient>,
    address: Pubkey,
    config: RpcAccountInfoConfig,
) -> Result<Subscription<AccountChange>, ChainError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let (mut stream, unsubscribe) = match client.account_subscribe(&address, Some(config)).await {
            Ok(pair) => {
                let _ = ready_tx.send(Ok(()));
                pair
            }
            Err(e) => {
                let _ = ready_tx.send(Err(ChainError::Subscription(e.to_string())));
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                item = stream.next() => {
                    let Some(response) = item else { break };
                    let change = AccountChange {
                        slot: response.context.slot,
                        lamports: response.value.lamports,
                    };
                    if event_tx.send(Ok(change)).is_err() {
                        break;
                    }
                }
            }
        }

        drop(stream);
        unsubscribe().await;
    });

    ready_rx
        .await
        .map_err(|_| ChainError::Subscription("account subscription task ended".into()))??;
    Ok(Subscription::new(event_rx, cancel_tx, task))
}

async fn signature_subscription(
    client: Arc<PubsubClient>,
    signature: Signature,
    config: RpcSignatureSubscribeConfig,
) -> Result<Subscription<RpcSignatureResult>, ChainError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let (mut stream, unsubscribe) =
            match client.signature_subscribe(&signature, Some(config)).await {
                Ok(pair) => {
                    let _ = ready_tx.send(Ok(()));
                    pair
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ChainError::Subscription(e.to_string())));
                    return;
                }
            };

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                item = stream.next() => {
                    let Some(response) = item else { break };
                    if event_tx.send(Ok(response.value)).is_err() {
                        break;
                    }
                }
            }
        }

        drop(stream);
        unsubscribe().await;
    });

    ready_rx
        .await
        .map_err(|_| ChainError::Subscription("signature subscription task ended".into()))??;
    Ok(Subscription::new(event_rx, cancel_tx, task))
}

/// Outcome of a signature notification. Receipt notifications carry none.
fn signature_outcome(result: RpcSignatureResult) -> Option<Result<(), ChainError>> {
    match result {
        RpcSignatureResult::ProcessedSignature(processed) => Some(match processed.err {
            Some(err) => Err(ChainError::TransactionFailed(err.to_string())),
            None => Ok(()),
        }),
        RpcSignatureResult::ReceivedSignature(_) => None,
    }
}

/// First definitive outcome: the already-landed status if there is one,
/// otherwise the first processed notification. `None` when the stream ends.
async fn wait_for_confirmation(
    mut subscription: Subscription<RpcSignatureResult>,
    landed: Option<Result<(), ChainError>>,
) -> Option<Result<(), ChainError>> {
    if landed.is_some() {
        return landed;
    }
    while let Some(item) = subscription.next().await {
        match item {
            Ok(result) => {
                if let Some(outcome) = signature_outcome(result) {
                    return Some(outcome);
                }
            }
            Err(e) => return Some(Err(e)),
        }
    }
    None
}

fn parse_keys(keys: &[String]) -> Result<Vec<Pubkey>, ChainError> {
    keys.iter()
        .map(|key| Pubkey::from_str(key).map_err(|e| ChainError::Decode(format!("{}: {}", key, e))))
        .collect()
}

/// Flatten an RPC transaction into resolved top-level and inner instructions.
fn decode_confirmed_transaction(
    signature: Signature,
    confirmed: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<DecodedTransaction, ChainError> {
    let versioned = confirmed
        .transaction
        .transaction
        .decode()
        .ok_or_else(|| ChainError::Decode(format!("undecodable transaction {}", signature)))?;
    let meta = confirmed.transaction.meta;

    let (writable, readonly) = match meta.as_ref().map(|m| &m.loaded_addresses) {
        Some(OptionSerializer::Some(loaded)) => {
            (parse_keys(&loaded.writable)?, parse_keys(&loaded.readonly)?)
        }
        _ => (Vec::new(), Vec::new()),
    };
    let keys = compat::full_account_keys(&versioned.message, &writable, &readonly);
    let instructions = compat::resolve_message_instructions(&versioned.message, &keys);

    let mut inner_instructions = Vec::new();
    let mut failed = false;
    if let Some(meta) = meta {
        failed = meta.err.is_some();
        if let OptionSerializer::Some(groups) = meta.inner_instructions {
            for group in groups {
                for instruction in group.instructions {
                    let UiInstruction::Compiled(compiled) = instruction else {
                        continue;
                    };
                    let Ok(data) = bs58::decode(&compiled.data).into_vec() else {
                        warn!(signature = %signature, "Inner instruction data is not base58");
                        continue;
                    };
                    if let Some(parsed) = compat::resolve_instruction(
                        compiled.program_id_index,
                        &compiled.accounts,
                        data,
                        &keys,
                    ) {
                        inner_instructions.push(parsed);
                    }
                }
            }
        }
    }

    Ok(DecodedTransaction {
        signature,
        instructions,
        inner_instructions,
        failed,
    })
}
