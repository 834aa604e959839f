//! Jito bundle submission
//!
//! [`Bundler`] abstracts the privileged delivery path: a set of transactions
//! submitted as one unit. [`JitoBundler`] posts them to a block engine's
//! JSON-RPC `sendBundle` method as base58-encoded wire transactions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;

use super::errors::TransactionBuilderError;

const BUNDLE_PATH: &str = "/api/v1/bundles";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Bundler: Send + Sync {
    /// Submit `transactions` as one bundle, returning the bundle id.
    async fn send_bundle(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<String, TransactionBuilderError>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

pub struct JitoBundler {
    client: reqwest::Client,
    endpoint: String,
}

impl JitoBundler {
    /// `block_engine_url` without the bundle path, e.g. `https://mainnet.block-engine.jito.wtf`
    pub fn new(block_engine_url: &str) -> Result<Self, TransactionBuilderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransactionBuilderError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", block_engine_url.trim_end_matches('/'), BUNDLE_PATH),
        })
    }

    fn encode(tx: &VersionedTransaction) -> Result<String, TransactionBuilderError> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| TransactionBuilderError::Bundler(format!("serialize: {}", e)))?;
        Ok(bs58::encode(bytes).into_string())
    }
}

#[async_trait]
impl Bundler for JitoBundler {
    async fn send_bundle(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<String, TransactionBuilderError> {
        if transactions.is_empty() {
            return Err(TransactionBuilderError::Bundler("empty bundle".into()));
        }
        let encoded = transactions
            .iter()
            .map(Self::encode)
            .collect::<Result<Vec<_>, _>>()?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransactionBuilderError::Bundler(e.to_string()))?;

        let status = response.status();
        let parsed: RpcResponse = response.json().await.map_err(|e| {
            TransactionBuilderError::Bundler(format!("bad response ({}): {}", status, e))
        })?;

        match (parsed.result, parsed.error) {
            (_, Some(error)) => Err(TransactionBuilderError::Bundler(error.message)),
            (Some(bundle_id), None) => Ok(bundle_id),
            (None, None) => Err(TransactionBuilderError::Bundler(format!(
                "no bundle id in response ({})",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash, pubkey::Pubkey, signature::Keypair, signer::Signer, system_instruction,
        transaction::Transaction,
    };

    fn signed_tx() -> VersionedTransaction {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        Transaction::new_signed_with_payer(&[ix], Some(&payer.pubkey()), &[&payer], Hash::new_unique())
            .into()
    }

    #[tokio::test]
    async fn test_send_bundle_posts_json_rpc() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/bundles")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "sendBundle"
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"bundle-123"}"#)
            .create_async()
            .await;

        let bundler = JitoBundler::new(&server.url()).unwrap();
        let id = bundler.send_bundle(&[signed_tx()]).await.unwrap();
        assert_eq!(id, "bundle-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_bundle_surfaces_rpc_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/bundles")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bundle contains an already processed transaction"}}"#)
            .create_async()
            .await;

        let bundler = JitoBundler::new(&server.url()).unwrap();
        let err = bundler.send_bundle(&[signed_tx()]).await.unwrap_err();
        assert!(err.to_string().contains("already processed"));
    }

    #[tokio::test]
    async fn test_empty_bundle_rejected() {
        let bundler = JitoBundler::new("http://127.0.0.1:1").unwrap();
        assert!(bundler.send_bundle(&[]).await.is_err());
    }

    #[test]
    fn test_encoding_is_base58_wire_format() {
        let tx = signed_tx();
        let encoded = JitoBundler::encode(&tx).unwrap();
        let bytes = bs58::decode(encoded).into_vec().unwrap();
        let decoded: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.signatures, tx.signatures);
    }
}
