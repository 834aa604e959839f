use solana_sdk::signature::Signature;
use std::time::Duration;
use thiserror::Error;

use crate::chain::ChainError;
use crate::tx_builder::TransactionBuilderError;

/// Dispatch error types
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Building or signing the transaction failed
    #[error("Build error: {0}")]
    Build(#[from] TransactionBuilderError),

    /// Standard broadcast was rejected
    #[error("Send error: {0}")]
    Send(ChainError),

    /// Privileged bundle submission was rejected
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// Landed but the program returned an error
    #[error("Transaction {signature} failed: {reason}")]
    Failed { signature: Signature, reason: String },

    /// Not confirmed before the confirmation timeout
    #[error("Transaction {signature} unconfirmed after {timeout:?}")]
    Unconfirmed {
        signature: Signature,
        timeout: Duration,
    },

    /// Confirmation polling itself failed
    #[error("Confirmation error for {signature}: {source}")]
    Confirmation {
        signature: Signature,
        source: ChainError,
    },

    /// The cluster has already seen this exact transaction
    #[error("Transaction already processed: {0}")]
    AlreadyProcessed(Signature),
}

impl DispatchError {
    /// Classify a confirmation failure for `signature`.
    pub fn from_confirmation(signature: Signature, err: ChainError) -> Self {
        match err {
            ChainError::AlreadyProcessed(_) => Self::AlreadyProcessed(signature),
            ChainError::Timeout(timeout) => Self::Unconfirmed { signature, timeout },
            ChainError::TransactionFailed(reason) => Self::Failed { signature, reason },
            source => Self::Confirmation { signature, source },
        }
    }

    /// Classify a rejected submission for `signature`.
    pub fn from_send(signature: Signature, err: ChainError) -> Self {
        match err {
            ChainError::AlreadyProcessed(_) => Self::AlreadyProcessed(signature),
            other => Self::Send(other),
        }
    }

    /// Classify a rejected bundle for `signature`.
    pub fn from_bundle(signature: Signature, err: TransactionBuilderError) -> Self {
        let message = err.to_string();
        match ChainError::from_message(message.clone()) {
            ChainError::AlreadyProcessed(_) => Self::AlreadyProcessed(signature),
            _ => Self::Bundle(message),
        }
    }

    /// Signature of a duplicate submission, which callers treat as success.
    pub fn duplicate_signature(&self) -> Option<Signature> {
        match self {
            Self::AlreadyProcessed(signature) => Some(*signature),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Send(e) => e.is_retryable(),
            Self::Build(e) => e.is_retryable(),
            Self::Bundle(_) => true,
            Self::Unconfirmed { .. } => true,
            Self::Confirmation { source, .. } => source.is_retryable(),
            Self::Failed { .. } => false,
            Self::AlreadyProcessed(_) => false,
        }
    }
}

/// Retry policy for bounded polling loops
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,

    /// Base delay in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,

    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter_factor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Same delay between every attempt, no jitter.
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            jitter_factor: 0.0,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-based), `None` once exhausted.
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }

        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let jitter = (fastrand::f64() - 0.5) * 2.0 * self.jitter_factor;
        let jittered_delay = (delay_ms * (1.0 + jitter)).max(0.0) as u64;

        Some(Duration::from_millis(jittered_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_submission_is_recognised() {
        let sig = Signature::new_unique();
        let err = DispatchError::from_send(
            sig,
            ChainError::from_message("Transaction already been processed"),
        );
        assert_eq!(err.duplicate_signature(), Some(sig));

        let bundle_err = DispatchError::from_bundle(
            sig,
            TransactionBuilderError::Bundler("bundle contains an already processed transaction".into()),
        );
        assert!(bundle_err.duplicate_signature().is_none());

        let bundle_dup = DispatchError::from_bundle(
            sig,
            TransactionBuilderError::Bundler("This transaction has already been processed".into()),
        );
        assert_eq!(bundle_dup.duplicate_signature(), Some(sig));
    }

    #[test]
    fn test_confirmation_classification() {
        let sig = Signature::new_unique();
        assert!(matches!(
            DispatchError::from_confirmation(sig, ChainError::Timeout(Duration::from_secs(120))),
            DispatchError::Unconfirmed { .. }
        ));
        assert!(matches!(
            DispatchError::from_confirmation(sig, ChainError::TransactionFailed("slippage".into())),
            DispatchError::Failed { .. }
        ));
        assert!(!DispatchError::Failed {
            signature: sig,
            reason: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_fixed_retry_policy() {
        let policy = RetryPolicy::fixed(10, 200);
        for attempt in 0..9 {
            assert_eq!(
                policy.calculate_delay(attempt),
                Some(Duration::from_millis(200))
            );
        }
        assert!(policy.calculate_delay(9).is_none());
    }

    #[test]
    fn test_exponential_retry_policy() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.calculate_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.calculate_delay(1), Some(Duration::from_millis(200)));
        assert!(policy.calculate_delay(2).is_none());
    }
}
