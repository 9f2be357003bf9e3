//! Standard Stellar network passphrases.
//!
//! Each Stellar network is identified by a unique passphrase. A captive
//! child process must be started with the passphrase of the network whose
//! history it replays, or it will reject the archive contents.
//!
//! | Network | Passphrase |
//! |---------|------------|
//! | Mainnet | `"Public Global Stellar Network ; September 2015"` |
//! | Testnet | `"Test SDF Network ; September 2015"` |

/// Passphrase of the Stellar public testnet.
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Passphrase of the Stellar public mainnet.
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Returns `true` if `passphrase` names the Stellar public mainnet.
pub fn is_mainnet(passphrase: &str) -> bool {
    passphrase == MAINNET_PASSPHRASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mainnet() {
        assert!(is_mainnet(MAINNET_PASSPHRASE));
        assert!(!is_mainnet(TESTNET_PASSPHRASE));
        assert!(!is_mainnet("My Private Network ; 2024"));
    }
}
