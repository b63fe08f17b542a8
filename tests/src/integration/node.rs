//! # Wired Node
//!
//! The fully assembled node: configuration, KMS, dev chain, publication
//! loop and reverse-hash forwarder.

#[cfg(test)]
mod tests {
    use crate::fixtures::schema;
    use id_03_identity_state::StateStorage;
    use node_runtime::config::KeyStoreConfig;
    use node_runtime::{IssuerConfig, IssuerNode};
    use std::time::Duration;
    use tokio::sync::watch;

    fn config(dir: &tempfile::TempDir) -> IssuerConfig {
        let vars = [
            ("ISSUER_ETHEREUM_CONFIRMATION_BLOCK_COUNT", "2"),
            ("ISSUER_ETHEREUM_WAIT_RECEIPT_CYCLE_TIME", "1"),
            ("ISSUER_ETHEREUM_WAIT_BLOCK_CYCLE_TIME", "1"),
            ("ISSUER_PUBLISHER_INTERVAL", "2"),
        ];
        let mut config = IssuerConfig::from_lookup(|var| {
            vars.iter()
                .find(|(name, _)| *name == var)
                .map(|(_, value)| value.to_string())
        })
        .unwrap();
        config.key_store = KeyStoreConfig {
            file_path: dir.path().join("keys.json"),
            ..KeyStoreConfig::default()
        };
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_node_publishes_and_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let node = IssuerNode::build(config(&dir)).await.unwrap();
        let identity = node.bootstrap_identity().await.unwrap();
        let did = identity.identifier;
        let genesis = node.engine().storage().current_state(&did).unwrap().unwrap();

        node.engine().add_claim(&did, schema(), b"alice").unwrap();
        let (tx, rx) = watch::channel(false);
        let handles = node.start(rx);

        for _ in 0..120 {
            if node.forwarder().forwarded() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(node.forwarder().forwarded(), 1);
        let current = node.engine().storage().current_state(&did).unwrap().unwrap();
        assert_eq!(current.previous_state, Some(genesis.state));
        let chain = node.dev_chain().unwrap();
        assert_eq!(chain.state_of(&did.numeric_id()), Some(current.state));

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
