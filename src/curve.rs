//! Constant-product bonding curve math
//!
//! The pump program prices tokens along `x * y = k` using *virtual* reserves.
//! Quotes are computed in `u128`, which holds the product of two `u64`
//! reserves exactly, so no precision is lost before the final slippage step.
//! The slippage multiplier is applied by splitting the `f64` into its exact
//! mantissa and exponent, so the result is the true floor of `raw * m`.

use thiserror::Error;

use crate::types::LAMPORTS_PER_SOL;

/// Minimum length of the bonding curve account prefix we decode.
pub const SNAPSHOT_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    #[error("bonding curve data too short: {0} bytes, need {SNAPSHOT_LEN}")]
    Decode(usize),

    #[error("slippage multiplier must be within [0, 1], got {0}")]
    InvalidSlippage(f64),

    #[error("bonding curve has no virtual SOL reserves")]
    EmptyReserves,
}

/// Reserve state read from a bonding curve account.
///
/// Layout (little endian): `[0..8)` real token reserves, `[8..16)` virtual
/// token reserves, `[16..24)` virtual SOL reserves. Trailing bytes are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondingCurveSnapshot {
    pub real_token_reserves: u64,
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
}

impl BondingCurveSnapshot {
    pub fn decode(data: &[u8]) -> Result<Self, CurveError> {
        if data.len() < SNAPSHOT_LEN {
            return Err(CurveError::Decode(data.len()));
        }

        let word = |index: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[index * 8..index * 8 + 8]);
            u64::from_le_bytes(buf)
        };

        Ok(Self {
            real_token_reserves: word(0),
            virtual_token_reserves: word(1),
            virtual_sol_reserves: word(2),
        })
    }

    /// Virtual SOL reserves expressed in SOL.
    pub fn sol_reserves(&self) -> f64 {
        self.virtual_sol_reserves as f64 / LAMPORTS_PER_SOL as f64
    }

    /// Tokens received for `lamports`, scaled down by `slippage` and floored.
    pub fn buy_quote(&self, lamports: u64, slippage: f64) -> Result<u64, CurveError> {
        if !(0.0..=1.0).contains(&slippage) {
            return Err(CurveError::InvalidSlippage(slippage));
        }
        if self.virtual_sol_reserves == 0 {
            return Err(CurveError::EmptyReserves);
        }

        let virtual_sol = u128::from(self.virtual_sol_reserves);
        let virtual_tokens = u128::from(self.virtual_token_reserves);

        let k = virtual_sol * virtual_tokens;
        let new_virtual_sol = virtual_sol + u128::from(lamports);
        let new_virtual_tokens = k / new_virtual_sol;
        // new_virtual_sol >= virtual_sol, so new_virtual_tokens <= virtual_tokens
        let raw = virtual_tokens - new_virtual_tokens;

        Ok(scale_floor(raw, slippage))
    }
}

/// `floor(value * multiplier)` for `value < 2^64` and `multiplier` in `[0, 1]`.
fn scale_floor(value: u128, multiplier: f64) -> u64 {
    if multiplier == 0.0 || value == 0 {
        return 0;
    }
    if multiplier == 1.0 {
        return value as u64;
    }

    let bits = multiplier.to_bits();
    let biased_exp = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if biased_exp == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exp - 1075)
    };

    // multiplier < 1 always gives exp <= -53
    let shift = exp.unsigned_abs();
    if shift >= 128 {
        return 0;
    }
    ((value * u128::from(mantissa)) >> shift) as u64
}
