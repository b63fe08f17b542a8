//! # Publication Lifecycle
//!
//! One identity at a time: claims and revocations enter the trees, the
//! resulting state is proved, submitted and confirmed, and every confirmed
//! state chains onto the previous one.

#[cfg(test)]
mod tests {
    use crate::fixtures::{running, Fixture, CONFIRMATION_BLOCKS};
    use id_02_merkle_store::{nonce_key, TreeKind};
    use id_03_identity_state::{StateStorage, TransitionOutcome};
    use id_05_eth_gateway::GatewayError;
    use id_06_publisher::{PublicationOutcome, PublishError};
    use primitive_types::U256;
    use shared_bus::{EventFilter, EventTopic, IssuerEvent};
    use shared_types::{IdentityState, StateStatus};

    fn confirmed(outcome: PublicationOutcome) -> IdentityState {
        match outcome {
            PublicationOutcome::Confirmed(state) => state,
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_three_claims_confirm_and_notify_revocation_root() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, genesis) = f.identity().await;
        let mut notices = f
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::RevocationStatus]));
        for data in ["alice", "bob", "carol"] {
            f.claim(&did, data);
        }
        let (_tx, rx) = running();

        let state = confirmed(publisher.publish_state(&did, &rx).await.unwrap());

        // Only the claims and roots trees moved.
        let roots = f.engine.trees().current_roots(&did).unwrap();
        assert_eq!(roots.revocation, genesis.revocation_tree_root);
        assert_ne!(roots.claims, genesis.claims_tree_root);
        assert_eq!(roots.state_hash(), state.state);

        assert_eq!(state.status, StateStatus::Confirmed);
        assert_eq!(state.tx_nonce, Some(0));
        assert_eq!(state.previous_state, Some(genesis.state));
        let head = f.chain.mine_blocks(0);
        assert!(head >= state.block_number.unwrap() + CONFIRMATION_BLOCKS);
        assert_eq!(f.chain.state_of(&did.numeric_id()), Some(state.state));

        match notices.try_recv().unwrap() {
            Some(IssuerEvent::RevocationRootPublished {
                identifier,
                state: notified,
                revocation_tree_root,
            }) => {
                assert_eq!(identifier, did);
                assert_eq!(notified, state.state);
                assert_eq!(revocation_tree_root, genesis.revocation_tree_root);
            }
            other => panic!("expected revocation notice, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receipt_fails_then_resubmits_same_state() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, _) = f.identity().await;
        f.claim(&did, "alice");
        f.chain.set_include_transactions(false);
        let (_tx, rx) = running();

        let failed = match publisher.publish_state(&did, &rx).await.unwrap() {
            PublicationOutcome::Failed(state) => state,
            other => panic!("expected failure, got {other:?}"),
        };
        assert_eq!(failed.status, StateStatus::Failed);
        assert!(failed
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("ConfirmationTimeout"));

        // The next cycle still sees the identity as pending.
        let pending = f.engine.storage().identities_with_pending_changes().unwrap();
        assert_eq!(pending, vec![did.clone()]);

        f.chain.drop_pending_transactions();
        f.chain.set_include_transactions(true);
        let report = publisher.publish_all(&rx).await.unwrap();
        assert_eq!(report.confirmed, 1);

        let current = f.current_state(&did);
        assert_eq!(current.state_id, failed.state_id);
        assert_eq!(current.state, failed.state);
        assert_eq!(f.chain.state_of(&did.numeric_id()), Some(failed.state));
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    #[tokio::test]
    async fn test_transition_without_changes_is_idempotent() {
        let f = Fixture::new().await;
        let (did, genesis) = f.identity().await;

        for _ in 0..2 {
            assert!(matches!(
                f.engine.compute_transition(&did).unwrap(),
                TransitionOutcome::NoPendingChanges(Some(ref latest)) if latest.state_id == genesis.state_id
            ));
        }
        assert_eq!(f.states(&did).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_states_form_a_chain() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, _) = f.identity().await;
        let (_tx, rx) = running();

        for round in 0..4 {
            f.claim(&did, &format!("holder-{round}"));
            confirmed(publisher.publish_state(&did, &rx).await.unwrap());
        }

        let confirmed: Vec<IdentityState> = f
            .states(&did)
            .into_iter()
            .filter(|s| s.status == StateStatus::Confirmed)
            .collect();
        assert_eq!(confirmed.len(), 5);
        assert!(confirmed[0].is_genesis());
        for pair in confirmed.windows(2) {
            assert_eq!(pair[1].previous_state, Some(pair[0].state));
        }
        assert_eq!(
            f.chain.state_of(&did.numeric_id()),
            Some(confirmed[4].state)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_revocation_leaves_claims_root() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, _) = f.identity().await;
        let claim = f.claim(&did, "alice");
        let (_tx, rx) = running();
        let first = confirmed(publisher.publish_state(&did, &rx).await.unwrap());

        let unrelated = claim.rev_nonce.wrapping_add(1).max(1);
        f.engine.revoke_claim(&did, unrelated).unwrap();
        let second = confirmed(publisher.publish_state(&did, &rx).await.unwrap());

        assert_eq!(second.claims_tree_root, first.claims_tree_root);
        assert_ne!(second.revocation_tree_root, first.revocation_tree_root);

        let trees = f.engine.trees();
        assert!(trees.is_revoked(&did, unrelated, None).unwrap());
        assert!(!trees.is_revoked(&did, claim.rev_nonce, None).unwrap());
        assert!(!trees
            .is_revoked(&did, unrelated, Some(first.revocation_tree_root))
            .unwrap());

        // Third parties can check both facts against the published roots.
        let (inclusion, root) = trees
            .generate_proof(&did, TreeKind::Claims, &claim.index_hash, None)
            .unwrap();
        assert_eq!(root, second.claims_tree_root);
        assert!(inclusion.existence);
        assert!(inclusion.verify(&root, &claim.index_hash));

        let key = nonce_key(claim.rev_nonce);
        let (absence, root) = trees
            .generate_proof(&did, TreeKind::Revocation, &key, None)
            .unwrap();
        assert_eq!(root, second.revocation_tree_root);
        assert!(!absence.existence);
        assert!(absence.verify(&root, &key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_ceiling_submits_nothing() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, _) = f.identity().await;
        f.claim(&did, "alice");
        f.chain.set_gas_price(U256::from(50_000));
        let (_tx, rx) = running();

        let err = publisher.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Gateway(GatewayError::GasPriceExceeded { .. })
        ));
        let before = f.engine.storage().in_flight_state(&did).unwrap().unwrap();

        let err = publisher.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Gateway(GatewayError::GasPriceExceeded { .. })
        ));
        let after = f.engine.storage().in_flight_state(&did).unwrap().unwrap();

        assert_eq!(f.chain.accepted_transactions(), 0);
        assert_eq!(after.state_id, before.state_id);
        assert_eq!(after.state, before.state);
        assert_eq!(after.status, StateStatus::Pending);
        assert_eq!(after.tx_hash, None);
        assert_eq!(after.attempt, before.attempt);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoking_a_published_claim() {
        let f = Fixture::new().await;
        let publisher = f.publisher(4);
        let (did, _) = f.identity().await;
        let claim = f.claim(&did, "alice");
        let (_tx, rx) = running();
        let issued = confirmed(publisher.publish_state(&did, &rx).await.unwrap());

        f.engine.revoke_claim(&did, claim.rev_nonce).unwrap();
        let revoked = confirmed(publisher.publish_state(&did, &rx).await.unwrap());

        let trees = f.engine.trees();
        assert!(trees
            .is_revoked(&did, claim.rev_nonce, Some(revoked.revocation_tree_root))
            .unwrap());
        assert!(!trees
            .is_revoked(&did, claim.rev_nonce, Some(issued.revocation_tree_root))
            .unwrap());
        assert!(f.engine.storage().pending_revocations(&did).unwrap().is_empty());
    }

    // =========================================================================
    // CALLER ERRORS
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_and_inactive_identities_are_rejected() {
        let f = Fixture::new().await;
        let publisher = f.publisher(1);
        let (did, _) = f.identity().await;
        let (_tx, rx) = running();

        let stranger = shared_types::Did::new("polygonid", "polygon", "amoy", "unknown").unwrap();
        let err = publisher.publish_state(&stranger, &rx).await.unwrap_err();
        assert!(matches!(err, PublishError::UnknownIdentity(_)));
        assert!(err.is_caller_error());

        f.claim(&did, "alice");
        f.engine.deactivate_identity(&did).unwrap();
        assert!(publisher.publish_state(&did, &rx).await.is_err());
        assert_eq!(f.states(&did).len(), 1);
        assert_eq!(f.chain.accepted_transactions(), 0);
    }
}
