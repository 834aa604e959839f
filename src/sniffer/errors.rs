//! Error types and retry policies for the Sniffer module

use std::fmt;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::chain::ChainError;

/// Main error type for Sniffer operations
#[derive(Debug, Clone)]
pub enum SnifferError {
    /// Log subscription could not be established
    Subscription(String),
    /// Log stream ended unexpectedly
    StreamDisconnected,
    /// Buy engine channel closed
    ChannelClosed,
    /// Lookup of the launch transaction failed
    Chain(ChainError),
    /// Launch transaction could not be decoded
    Decode(DecodeError),
}

impl fmt::Display for SnifferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscription(msg) => write!(f, "Subscription error: {}", msg),
            Self::StreamDisconnected => write!(f, "Log stream disconnected"),
            Self::ChannelClosed => write!(f, "Candidate channel closed"),
            Self::Chain(err) => write!(f, "Chain error: {}", err),
            Self::Decode(err) => write!(f, "Decode error: {}", err),
        }
    }
}

impl std::error::Error for SnifferError {}

impl From<ChainError> for SnifferError {
    fn from(err: ChainError) -> Self {
        Self::Chain(err)
    }
}

impl From<DecodeError> for SnifferError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Error type for launch transaction decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No pump `create` instruction in the transaction
    MissingCreate,
    /// No buy by the creator in the launch transaction
    NoCreatorBuy { creator: Pubkey },
    /// Instruction has fewer accounts than its layout requires
    MissingAccount { instruction: &'static str, index: usize },
    /// Instruction data ended early
    Truncated { instruction: &'static str, needed: usize, got: usize },
    /// Borsh string is not valid UTF-8
    InvalidString,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCreate => write!(f, "No create instruction"),
            Self::NoCreatorBuy { creator } => write!(f, "No creator buy from {}", creator),
            Self::MissingAccount { instruction, index } => {
                write!(f, "{} instruction missing account #{}", instruction, index)
            }
            Self::Truncated { instruction, needed, got } => write!(
                f,
                "{} instruction data truncated: need {} bytes, got {}",
                instruction, needed, got
            ),
            Self::InvalidString => write!(f, "Invalid UTF-8 string"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Exponential backoff with jitter for retry logic
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_attempt: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            current_attempt: 0,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Get the next backoff duration with jitter
    pub fn next_backoff(&mut self) -> Duration {
        let factor = 2_u64.saturating_pow(self.current_attempt.min(32));
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);

        self.current_attempt = self.current_attempt.saturating_add(1);

        // Add jitter (±20%)
        let jitter = backoff_ms / 5;
        let final_backoff = if jitter == 0 {
            backoff_ms
        } else {
            backoff_ms - jitter + fastrand::u64(0..=2 * jitter)
        };

        Duration::from_millis(final_backoff)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
