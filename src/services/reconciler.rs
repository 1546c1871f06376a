use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Chain, LinkedWallet, ProviderEvent};
use crate::services::backend::WalletRegistry;

/// Shortened form for display, `0x1234...abcd` style.
fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Keeps the set of locally connected wallets consistent with the backend
/// registry as provider events arrive. At most one wallet per chain. A
/// first connection the backend does not know stays current but unbound
/// until `register_current`; a switch away from a bound address to an
/// unknown one empties the slot rather than leaving a stale binding behind.
pub struct WalletLinkReconciler {
    registry: Arc<dyn WalletRegistry>,
    slots: RwLock<HashMap<Chain, LinkedWallet>>,
}

impl WalletLinkReconciler {
    pub fn new(registry: Arc<dyn WalletRegistry>) -> Self {
        Self {
            registry,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub async fn handle_event(&self, event: ProviderEvent) -> Result<()> {
        match event {
            ProviderEvent::Connected {
                chain,
                address,
                public_key: _,
            } => self.bind(chain, &address, false).await,
            ProviderEvent::AccountChanged { chain, address } => {
                let current = {
                    let slots = self.slots.read().await;
                    slots.get(&chain).map(|wallet| wallet.address.clone())
                };
                if let Some(current) = &current {
                    if chain.addresses_equal(current, &address) {
                        return Ok(());
                    }
                }
                self.bind(chain, &address, current.is_some()).await
            }
            ProviderEvent::Disconnected { chain } => {
                let removed = self.slots.write().await.remove(&chain);
                if let Some(wallet) = removed {
                    if let Some(wallet_id) = wallet.backend_wallet_id.as_deref() {
                        // Best effort: the local slot is already cleared.
                        if let Err(err) = self.registry.delete_connected_wallet(wallet_id).await {
                            tracing::warn!(
                                "failed to delete backend wallet {} on disconnect: {}",
                                wallet_id,
                                err
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Resolves the address against the backend, scoped to the chain. Found
    /// means the slot binds to that backend wallet. Not found on a switch
    /// away from an existing binding empties the slot, never leaving it
    /// pointing at the previous account; not found on a fresh connection
    /// keeps the wallet current but unbound.
    async fn bind(&self, chain: Chain, address: &str, replacing_current: bool) -> Result<()> {
        let normalized = chain.normalize_address(address);
        let lookup = self.registry.wallet_by_address(&normalized, chain).await;

        let mut slots = self.slots.write().await;
        match lookup {
            Ok(Some(wallet_id)) => {
                slots.insert(
                    chain,
                    LinkedWallet {
                        address: normalized.clone(),
                        chain,
                        display_name: short_address(&normalized),
                        backend_wallet_id: Some(wallet_id),
                    },
                );
                Ok(())
            }
            Ok(None) if replacing_current => {
                tracing::info!(
                    "{} switched to unregistered wallet {}, clearing the slot",
                    chain,
                    short_address(&normalized)
                );
                slots.remove(&chain);
                Ok(())
            }
            Ok(None) => {
                tracing::info!(
                    "{} wallet {} is not registered with the backend",
                    chain,
                    short_address(&normalized)
                );
                slots.insert(
                    chain,
                    LinkedWallet {
                        address: normalized.clone(),
                        chain,
                        display_name: short_address(&normalized),
                        backend_wallet_id: None,
                    },
                );
                Ok(())
            }
            Err(err) => {
                // Lookup failure is not "not registered"; keep whatever was
                // bound and surface the error.
                tracing::warn!("{} wallet lookup failed: {}", chain, err);
                Err(err)
            }
        }
    }

    /// Registers the currently connected address with the backend and binds
    /// the returned wallet id to the slot.
    pub async fn register_current(
        &self,
        chain: Chain,
        address: &str,
        public_key: Option<&str>,
        note: Option<&str>,
    ) -> Result<String> {
        let normalized = chain.normalize_address(address);
        let wallet_id = self
            .registry
            .register_connected_wallet(chain, &normalized, public_key, note)
            .await?;

        let mut slots = self.slots.write().await;
        slots.insert(
            chain,
            LinkedWallet {
                address: normalized.clone(),
                chain,
                display_name: short_address(&normalized),
                backend_wallet_id: Some(wallet_id.clone()),
            },
        );
        Ok(wallet_id)
    }

    pub async fn linked_wallet(&self, chain: Chain) -> Option<LinkedWallet> {
        self.slots.read().await.get(&chain).cloned()
    }

    /// All bound wallets in a stable chain order.
    pub async fn linked_wallets(&self) -> Vec<LinkedWallet> {
        let slots = self.slots.read().await;
        [Chain::Ethereum, Chain::Bsc, Chain::Solana, Chain::Tron]
            .into_iter()
            .filter_map(|chain| slots.get(&chain).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Registry fixture keyed by (chain, address).
    struct MockRegistry {
        known: Mutex<HashMap<(Chain, String), String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl MockRegistry {
        fn new() -> Self {
            Self {
                known: Mutex::new(HashMap::new()),
                deleted: Mutex::new(Vec::new()),
            }
        }

        fn insert(&self, chain: Chain, address: &str, wallet_id: &str) {
            self.known
                .lock()
                .unwrap()
                .insert((chain, address.to_string()), wallet_id.to_string());
        }
    }

    #[async_trait]
    impl WalletRegistry for MockRegistry {
        async fn wallet_by_address(&self, address: &str, chain: Chain) -> Result<Option<String>> {
            Ok(self
                .known
                .lock()
                .unwrap()
                .get(&(chain, address.to_string()))
                .cloned())
        }

        async fn register_connected_wallet(
            &self,
            chain: Chain,
            address: &str,
            _public_key: Option<&str>,
            _note: Option<&str>,
        ) -> Result<String> {
            let wallet_id = format!("w-{}-{}", chain, address);
            self.insert(chain, address, &wallet_id);
            Ok(wallet_id)
        }

        async fn delete_connected_wallet(&self, wallet_id: &str) -> Result<()> {
            self.deleted.lock().unwrap().push(wallet_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn connect_binds_a_registered_wallet() {
        let registry = Arc::new(MockRegistry::new());
        registry.insert(Chain::Ethereum, "0xabc1", "w-1");
        let reconciler = WalletLinkReconciler::new(registry);

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Ethereum,
                address: "0xABC1".into(),
                public_key: None,
            })
            .await
            .unwrap();

        let wallet = reconciler.linked_wallet(Chain::Ethereum).await.unwrap();
        assert_eq!(wallet.address, "0xabc1");
        assert_eq!(wallet.backend_wallet_id.as_deref(), Some("w-1"));
    }

    #[tokio::test]
    async fn first_connection_to_an_unregistered_address_stays_unbound() {
        let registry = Arc::new(MockRegistry::new());
        let reconciler = WalletLinkReconciler::new(registry);

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Ethereum,
                address: "0xDeF2".into(),
                public_key: None,
            })
            .await
            .unwrap();

        // Current and displayable, waiting on register_current for an id.
        let wallet = reconciler.linked_wallet(Chain::Ethereum).await.unwrap();
        assert_eq!(wallet.address, "0xdef2");
        assert_eq!(wallet.backend_wallet_id, None);
    }

    #[tokio::test]
    async fn switching_to_an_unregistered_account_empties_the_slot() {
        let registry = Arc::new(MockRegistry::new());
        registry.insert(Chain::Ethereum, "0xabc1", "w-1");
        let reconciler = WalletLinkReconciler::new(registry);

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Ethereum,
                address: "0xabc1".into(),
                public_key: None,
            })
            .await
            .unwrap();
        reconciler
            .handle_event(ProviderEvent::AccountChanged {
                chain: Chain::Ethereum,
                address: "0xdef2".into(),
            })
            .await
            .unwrap();

        // No phantom binding to the previous account.
        assert!(reconciler.linked_wallet(Chain::Ethereum).await.is_none());
    }

    #[tokio::test]
    async fn account_change_to_the_same_address_is_a_no_op() {
        let registry = Arc::new(MockRegistry::new());
        registry.insert(Chain::Ethereum, "0xabc1", "w-1");
        let reconciler = WalletLinkReconciler::new(registry);

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Ethereum,
                address: "0xabc1".into(),
                public_key: None,
            })
            .await
            .unwrap();
        // Checksummed casing of the same account.
        reconciler
            .handle_event(ProviderEvent::AccountChanged {
                chain: Chain::Ethereum,
                address: "0xAbC1".into(),
            })
            .await
            .unwrap();

        assert!(reconciler.linked_wallet(Chain::Ethereum).await.is_some());
    }

    #[tokio::test]
    async fn disconnect_clears_the_slot_and_notifies_the_backend() {
        let registry = Arc::new(MockRegistry::new());
        registry.insert(Chain::Solana, "Owner111", "w-sol");
        let reconciler = WalletLinkReconciler::new(registry.clone());

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Solana,
                address: "Owner111".into(),
                public_key: Some("Owner111".into()),
            })
            .await
            .unwrap();
        reconciler
            .handle_event(ProviderEvent::Disconnected {
                chain: Chain::Solana,
            })
            .await
            .unwrap();

        assert!(reconciler.linked_wallet(Chain::Solana).await.is_none());
        assert_eq!(registry.deleted.lock().unwrap().as_slice(), ["w-sol"]);
    }

    #[tokio::test]
    async fn lookup_is_scoped_to_the_chain() {
        let registry = Arc::new(MockRegistry::new());
        // Same address string registered on Ethereum only.
        registry.insert(Chain::Ethereum, "0xabc1", "w-eth");
        let reconciler = WalletLinkReconciler::new(registry);

        reconciler
            .handle_event(ProviderEvent::Connected {
                chain: Chain::Bsc,
                address: "0xabc1".into(),
                public_key: None,
            })
            .await
            .unwrap();

        // The Ethereum registration never leaks into the BSC slot.
        let bsc = reconciler.linked_wallet(Chain::Bsc).await.unwrap();
        assert_eq!(bsc.backend_wallet_id, None);
        assert!(reconciler.linked_wallet(Chain::Ethereum).await.is_none());
    }

    #[tokio::test]
    async fn registration_binds_the_returned_wallet_id() {
        let registry = Arc::new(MockRegistry::new());
        let reconciler = WalletLinkReconciler::new(registry);

        let wallet_id = reconciler
            .register_current(Chain::Tron, "TOwner", None, Some("primary"))
            .await
            .unwrap();

        let wallet = reconciler.linked_wallet(Chain::Tron).await.unwrap();
        assert_eq!(wallet.backend_wallet_id, Some(wallet_id));
        let all = reconciler.linked_wallets().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].chain, Chain::Tron);
    }

    #[test]
    fn short_addresses_render_for_display() {
        assert_eq!(
            short_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234...5678"
        );
        assert_eq!(short_address("0xabc1"), "0xabc1");
        // Multi-byte input truncates on character boundaries.
        assert_eq!(short_address("ガガガガガガガガガガガガガ"), "ガガガガガガ...ガガガガ");
    }
}
