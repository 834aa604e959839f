//! Shared connection that is rebuilt after it stops serving requests
//!
//! The websocket behind [`solana_client::nonblocking::pubsub_client::PubsubClient`]
//! does not recover once it drops: every later subscribe on the same client
//! fails. [`Reconnecting`] keeps the live client in an [`ArcSwap`] and swaps in
//! a fresh one the first time an operation on it fails.

use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ChainError;

type Connector<C> = Box<dyn Fn() -> BoxFuture<'static, Result<C, ChainError>> + Send + Sync>;

pub struct Reconnecting<C> {
    current: ArcSwap<C>,
    connector: Connector<C>,
    /// Serializes reconnects so callers racing on one dead client share a single new one.
    reconnect_lock: Mutex<()>,
}

impl<C: Send + Sync + 'static> Reconnecting<C> {
    /// Open the first connection with `connector`, kept for later reconnects.
    pub async fn connect<F>(connector: F) -> Result<Self, ChainError>
    where
        F: Fn() -> BoxFuture<'static, Result<C, ChainError>> + Send + Sync + 'static,
    {
        let first = connector().await?;
        Ok(Self {
            current: ArcSwap::from_pointee(first),
            connector: Box::new(connector),
            reconnect_lock: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<C> {
        self.current.load_full()
    }

    /// Replace `stale` with a new connection. Returns the already-replaced
    /// client when another caller got there first.
    pub async fn reconnect(&self, stale: &Arc<C>) -> Result<Arc<C>, ChainError> {
        let _guard = self.reconnect_lock.lock().await;
        let current = self.current.load_full();
        if !Arc::ptr_eq(&current, stale) {
            return Ok(current);
        }

        let fresh = Arc::new((self.connector)().await?);
        self.current.store(Arc::clone(&fresh));
        info!("Pubsub connection re-established");
        Ok(fresh)
    }

    /// Run `op` against the current connection. A failure triggers one
    /// reconnect and one retry on the new connection before it is reported.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ChainError>
    where
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let client = self.current();
        match op(Arc::clone(&client)).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, "Pubsub request failed, reconnecting");
                let fresh = self.reconnect(&client).await?;
                op(fresh).await
            }
        }
    }
}
