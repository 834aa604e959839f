//! Creator vetting
//!
//! A launch is admitted only when the creator's own buy is inside the
//! configured band, the creator has never launched before, and every wallet
//! that recently funded the creator looks clean. Any lookup failure rejects
//! the launch.

use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::{ChainProvider, DecodedTransaction};
use crate::config::VettingConfig;
use crate::sniffer::decoder::decode_system_transfer;
use crate::store::CreatorStore;
use crate::types::CreatorPurchase;

/// Exchange hot wallets trusted as funding sources.
pub const EXCHANGE_ADDRESSES: [&str; 9] = [
    "AC5RDfQFmDS1deWZos921JfqscXdByf8BKHs5ACWjtW2",
    "42brAgAVNzMBP7aaktPvAmBSPEkehnFQejiZc53EpJFd",
    "ASTyfSima4LLAdDgoFGkgqoKowG1LZFDr9fAQrg7iaJZ",
    "H8sMJSCQxfKiFTCfDR3DUMLPwcRbM61LGFJ8N4dK3WjS",
    "GJRs4FwHtemZ5ZE9x3FNvJ8TMwitKTh21yxdRPqn7npE",
    "5tzFkiKscXHK5ZXCGbXZxdw7gTjjD1mBwuoFbhUvuAi9",
    "2ojv9BAiHUrvsm9gxDe7fJSzbNZSJcxZvf8dqmWGHG8S",
    "5VCwKtCXgCJ6kit5FybXjvriW3xELsFDhYrPSqtJNmcD",
    "2AQdpHJ2JpcEgPiATUXjQxA8QmafFegfQwSLWSprPicm",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Creator buy outside the accepted band (SOL)
    CreatorBuyOutOfBand(f64),
    RepeatCreator,
    NoFunders,
    UnsafeFunder(Pubkey),
    LookupFailed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatorBuyOutOfBand(sol) => write!(f, "creator buy {:.3} SOL out of band", sol),
            Self::RepeatCreator => write!(f, "creator launched before"),
            Self::NoFunders => write!(f, "no funding transfers found"),
            Self::UnsafeFunder(funder) => write!(f, "funder {} launched before", funder),
            Self::LookupFailed(msg) => write!(f, "lookup failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VettingDecision {
    Admit { funders: Vec<Pubkey> },
    Reject(RejectReason),
}

pub struct CreatorVetter {
    chain: Arc<dyn ChainProvider>,
    store: Arc<dyn CreatorStore>,
    config: VettingConfig,
    exchanges: HashSet<Pubkey>,
}

impl CreatorVetter {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        store: Arc<dyn CreatorStore>,
        config: VettingConfig,
    ) -> Self {
        let exchanges = EXCHANGE_ADDRESSES
            .iter()
            .map(|s| s.to_string())
            .chain(config.extra_exchange_addresses.iter().cloned())
            .filter_map(|address| match Pubkey::from_str(&address) {
                Ok(pubkey) => Some(pubkey),
                Err(e) => {
                    warn!(address = %address, error = %e, "Ignoring invalid exchange address");
                    None
                }
            })
            .collect();

        Self {
            chain,
            store,
            config,
            exchanges,
        }
    }

    pub fn is_exchange(&self, address: &Pubkey) -> bool {
        self.exchanges.contains(address)
    }

    /// Open band: a spend equal to either bound is out.
    pub fn spend_in_band(&self, spent: f64) -> bool {
        spent > self.config.min_creator_buy_sol && spent < self.config.max_creator_buy_sol
    }

    pub async fn vet(&self, creator: &Pubkey, purchase: &CreatorPurchase) -> VettingDecision {
        let spent = purchase.sol();
        if !self.spend_in_band(spent) {
            return VettingDecision::Reject(RejectReason::CreatorBuyOutOfBand(spent));
        }

        match self.store.has_created_asset_before(creator).await {
            Ok(false) => {}
            Ok(true) => return VettingDecision::Reject(RejectReason::RepeatCreator),
            Err(e) => return VettingDecision::Reject(RejectReason::LookupFailed(e.to_string())),
        }

        let history = match self
            .chain
            .get_recent_transactions(creator, self.config.funder_scan_depth)
            .await
        {
            Ok(history) => history,
            Err(e) => return VettingDecision::Reject(RejectReason::LookupFailed(e.to_string())),
        };

        let funders = self.find_funders(&history, creator);
        if funders.is_empty() {
            return VettingDecision::Reject(RejectReason::NoFunders);
        }
        debug!(creator = %creator, funders = funders.len(), "Checking funders");

        let verdicts = join_all(funders.iter().map(|funder| self.funder_is_safe(funder))).await;
        for (funder, verdict) in funders.iter().zip(verdicts) {
            match verdict {
                Ok(true) => {}
                Ok(false) => return VettingDecision::Reject(RejectReason::UnsafeFunder(*funder)),
                Err(reason) => return VettingDecision::Reject(reason),
            }
        }

        VettingDecision::Admit { funders }
    }

    /// First qualifying inbound transfer per transaction, newest first, capped.
    pub fn find_funders(&self, history: &[DecodedTransaction], creator: &Pubkey) -> Vec<Pubkey> {
        let min_lamports = self.config.min_funding_lamports();
        let mut funders: Vec<Pubkey> = Vec::with_capacity(self.config.max_funders);

        for tx in history.iter().filter(|tx| !tx.failed) {
            let funder = tx
                .instructions
                .iter()
                .filter_map(decode_system_transfer)
                .find(|transfer| transfer.from != *creator && transfer.lamports > min_lamports)
                .map(|transfer| transfer.from);

            if let Some(funder) = funder {
                if !funders.contains(&funder) {
                    funders.push(funder);
                }
            }
            if funders.len() >= self.config.max_funders {
                break;
            }
        }
        funders
    }

    async fn funder_is_safe(&self, funder: &Pubkey) -> Result<bool, RejectReason> {
        if self.is_exchange(funder) {
            return Ok(true);
        }
        self.store
            .has_created_asset_before(funder)
            .await
            .map(|launched| !launched)
            .map_err(|e| RejectReason::LookupFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::sniffer::decoder::fixtures::system_transfer_ix;
    use crate::store::InMemoryCreatorStore;
    use solana_sdk::signature::Signature;

    fn funding_tx(from: Pubkey, to: Pubkey, lamports: u64) -> DecodedTransaction {
        DecodedTransaction {
            signature: Signature::new_unique(),
            instructions: vec![system_transfer_ix(from, to, lamports)],
            inner_instructions: vec![],
            failed: false,
        }
    }

    fn vetter_with(chain: Arc<InMemoryChain>, store: InMemoryCreatorStore) -> CreatorVetter {
        CreatorVetter::new(chain, Arc::new(store), VettingConfig::default())
    }

    fn vetter() -> CreatorVetter {
        vetter_with(Arc::new(InMemoryChain::new()), InMemoryCreatorStore::new())
    }

    fn purchase(max_sol_cost: u64) -> CreatorPurchase {
        CreatorPurchase {
            max_sol_cost,
            token_account: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_exchange_allowlist_loaded() {
        let v = vetter();
        let exchange = Pubkey::from_str(EXCHANGE_ADDRESSES[0]).unwrap();
        assert!(v.is_exchange(&exchange));
        assert!(!v.is_exchange(&Pubkey::new_unique()));
    }

    #[test]
    fn test_find_funders_filters_and_caps() {
        let v = vetter();
        let creator = Pubkey::new_unique();
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let c = Pubkey::new_unique();
        let d = Pubkey::new_unique();

        let history = vec![
            funding_tx(creator, a, 5_000_000_000), // outbound
            funding_tx(a, creator, 50_000_000),    // exactly the threshold
            funding_tx(a, creator, 60_000_000),
            funding_tx(a, creator, 70_000_000), // duplicate funder
            funding_tx(b, creator, 1_000_000_000),
            funding_tx(c, creator, 1_000_000_000),
            funding_tx(d, creator, 1_000_000_000),
        ];

        assert_eq!(v.find_funders(&history, &creator), vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_creator_buy_band() {
        let v = vetter();
        let creator = Pubkey::new_unique();
        // 0.4 SOL and 2.6 SOL estimated spend
        let low = purchase(404_040_405);
        let high = purchase(2_626_262_627);
        assert!(matches!(
            v.vet(&creator, &low).await,
            VettingDecision::Reject(RejectReason::CreatorBuyOutOfBand(_))
        ));
        assert!(matches!(
            v.vet(&creator, &high).await,
            VettingDecision::Reject(RejectReason::CreatorBuyOutOfBand(_))
        ));
    }

    #[test]
    fn test_band_bounds_are_exclusive() {
        let v = vetter();
        assert!(!v.spend_in_band(0.5));
        assert!(!v.spend_in_band(2.5));
        assert!(v.spend_in_band(0.500_000_001));
        assert!(v.spend_in_band(2.499_999_999));
        assert!(!v.spend_in_band(f64::NAN));
    }

    #[tokio::test]
    async fn test_band_edges_through_vet() {
        let v = vetter();
        let creator = Pubkey::new_unique();
        let out_of_band = |decision: VettingDecision| {
            matches!(
                decision,
                VettingDecision::Reject(RejectReason::CreatorBuyOutOfBand(_))
            )
        };

        // nearest disclosed costs on either side of 0.5 and 2.5 SOL estimated spend
        assert!(out_of_band(v.vet(&creator, &purchase(505_050_505)).await));
        assert!(!out_of_band(v.vet(&creator, &purchase(505_050_506)).await));
        assert!(!out_of_band(v.vet(&creator, &purchase(2_525_252_525)).await));
        assert!(out_of_band(v.vet(&creator, &purchase(2_525_252_526)).await));
    }

    #[tokio::test]
    async fn test_failed_funding_transaction_is_skipped() {
        let chain = Arc::new(InMemoryChain::new());
        let creator = Pubkey::new_unique();
        let exchange = Pubkey::from_str(EXCHANGE_ADDRESSES[0]).unwrap();
        let v = vetter_with(chain.clone(), InMemoryCreatorStore::new());

        let mut failed = funding_tx(exchange, creator, 2_000_000_000);
        failed.failed = true;
        assert!(v.find_funders(std::slice::from_ref(&failed), &creator).is_empty());

        chain.add_transaction(failed, &[creator]);
        assert_eq!(
            v.vet(&creator, &purchase(1_010_101_011)).await,
            VettingDecision::Reject(RejectReason::NoFunders)
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_rejects() {
        let chain = Arc::new(InMemoryChain::new());
        let creator = Pubkey::new_unique();
        chain.fail_history_for(creator);
        let v = vetter_with(chain, InMemoryCreatorStore::new());

        let decision = v.vet(&creator, &purchase(1_010_101_011)).await;
        assert!(matches!(
            decision,
            VettingDecision::Reject(RejectReason::LookupFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_admission_rules() {
        let chain = Arc::new(InMemoryChain::new());
        let creator = Pubkey::new_unique();
        let exchange = Pubkey::from_str(EXCHANGE_ADDRESSES[3]).unwrap();
        let serial_launcher = Pubkey::new_unique();
        let store = InMemoryCreatorStore::with_creators([serial_launcher]);
        let v = vetter_with(chain.clone(), store);
        let one_sol = purchase(1_010_101_011);

        // no history at all
        assert_eq!(
            v.vet(&creator, &one_sol).await,
            VettingDecision::Reject(RejectReason::NoFunders)
        );

        chain.add_transaction(funding_tx(exchange, creator, 2_000_000_000), &[creator]);
        assert_eq!(
            v.vet(&creator, &one_sol).await,
            VettingDecision::Admit {
                funders: vec![exchange]
            }
        );

        chain.add_transaction(funding_tx(serial_launcher, creator, 500_000_000), &[creator]);
        assert_eq!(
            v.vet(&creator, &one_sol).await,
            VettingDecision::Reject(RejectReason::UnsafeFunder(serial_launcher))
        );

        assert_eq!(
            v.vet(&serial_launcher, &one_sol).await,
            VettingDecision::Reject(RejectReason::RepeatCreator)
        );
    }
}
