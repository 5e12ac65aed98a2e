//! Blockchain integration seam.
//!
//! The platform has no real chain backing: token identifiers and contract
//! addresses are fabricated. Callers only see the [`ChainClient`] trait so
//! a real signer/contract implementation can be dropped in later without
//! touching the route handlers.

use rand::Rng;
use serde::Serialize;

/// Identifiers produced by a mint operation
#[derive(Debug, Clone, Serialize)]
pub struct MintedToken {
    pub token_id: String,
    pub contract_address: String,
}

/// Chain operations the API layer depends on
pub trait ChainClient: Send + Sync {
    /// Fabricate (or, for a real backend, submit) a mint and return the
    /// resulting token identifiers.
    fn mint(&self) -> MintedToken;

    /// Network label surfaced by the status endpoint
    fn network(&self) -> &str;

    /// Whether a real chain backend is connected
    fn enabled(&self) -> bool;
}

/// Default implementation: openly fake.
///
/// Token ids are a hex timestamp plus random tail; the contract address is
/// a fixed placeholder. Nothing here touches a chain.
pub struct MockChainClient;

pub const MOCK_CONTRACT_ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";

impl ChainClient for MockChainClient {
    fn mint(&self) -> MintedToken {
        let millis = chrono::Utc::now().timestamp_millis();
        let tail: u32 = rand::thread_rng().gen();
        MintedToken {
            token_id: format!("0x{:x}{:08x}", millis, tail),
            contract_address: MOCK_CONTRACT_ADDRESS.to_string(),
        }
    }

    fn network(&self) -> &str {
        "hardhat-local"
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// Fabricate an IPFS-style CID for uploaded cover images.
pub fn fake_ipfs_cid() -> String {
    let mut rng = rand::thread_rng();
    let alphabet = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let tail: String = (0..44)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect();
    format!("ipfs://Qm{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_unique_and_hex() {
        let client = MockChainClient;
        let a = client.mint();
        let b = client.mint();
        assert!(a.token_id.starts_with("0x"));
        assert_ne!(a.token_id, b.token_id);
        assert_eq!(a.contract_address, MOCK_CONTRACT_ADDRESS);
    }

    #[test]
    fn fake_cid_shape() {
        let cid = fake_ipfs_cid();
        assert!(cid.starts_with("ipfs://Qm"));
        assert_eq!(cid.len(), "ipfs://Qm".len() + 44);
    }
}
