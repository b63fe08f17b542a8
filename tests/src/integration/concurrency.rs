//! # Concurrency
//!
//! Single flight across replicas sharing one store, the bounded worker
//! pool, and nonce sequencing on a shared publishing key.

#[cfg(test)]
mod tests {
    use crate::fixtures::{running, Fixture};
    use id_03_identity_state::StateStorage;
    use id_06_publisher::{PublicationOutcome, PublishError};
    use shared_types::{KeyType, StateStatus};
    use std::collections::BTreeSet;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_racing_replicas_publish_once() {
        let f = Fixture::new().await;
        let (did, _) = f.identity().await;
        f.claim(&did, "alice");
        let (_tx, rx) = running();

        let replicas = [f.publisher(2), f.publisher(2)];
        let tasks: Vec<_> = replicas
            .iter()
            .map(|publisher| {
                let publisher = publisher.clone();
                let did = did.clone();
                let rx = rx.clone();
                tokio::spawn(async move { publisher.publish_state(&did, &rx).await })
            })
            .collect();

        let mut confirmed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(PublicationOutcome::Confirmed(_)) => confirmed += 1,
                Ok(PublicationOutcome::NothingToPublish) => {}
                Err(PublishError::PublicationInProgress(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(confirmed, 1);
        assert_eq!(f.chain.accepted_transactions(), 1);
        assert_eq!(f.states(&did).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_claims_wait_for_in_flight_transition() {
        let f = Fixture::new().await;
        let first_replica = f.publisher(1);
        let second_replica = f.publisher(1);
        let (did, _) = f.identity().await;
        f.claim(&did, "alice");
        f.chain.set_include_transactions(false);
        let (_tx, rx) = running();

        let in_flight = {
            let publisher = first_replica.clone();
            let did = did.clone();
            let rx = rx.clone();
            tokio::spawn(async move { publisher.publish_state(&did, &rx).await })
        };
        while f.chain.accepted_transactions() == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let transacted = f.engine.storage().in_flight_state(&did).unwrap().unwrap();
        assert_eq!(transacted.status, StateStatus::Transacted);

        // Claims can still be recorded, but no transition may start.
        let late = f.claim(&did, "bob");
        let err = second_replica.publish_state(&did, &rx).await.unwrap_err();
        assert!(matches!(err, PublishError::PublicationInProgress(_)));
        assert_eq!(f.states(&did).len(), 2);

        f.chain.set_include_transactions(true);
        let first = match in_flight.await.unwrap().unwrap() {
            PublicationOutcome::Confirmed(state) => state,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert!(f.engine.storage().pending_claims(&did).unwrap().contains(&late));

        let second = match second_replica.publish_state(&did, &rx).await.unwrap() {
            PublicationOutcome::Confirmed(state) => state,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert_eq!(second.previous_state, Some(first.state));
        assert!(f.engine.storage().pending_claims(&did).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_pool_publishes_every_identity() {
        let f = Fixture::new().await;
        let publisher = f.publisher(2);
        let mut identities = Vec::new();
        for i in 0..6 {
            let (did, _) = f.identity().await;
            f.claim(&did, &format!("holder-{i}"));
            identities.push(did);
        }
        let (_tx, rx) = running();

        let report = publisher.publish_all(&rx).await.unwrap();
        assert_eq!(report.confirmed, 6);
        assert_eq!(report.total(), 6);
        for did in &identities {
            assert_eq!(
                f.chain.state_of(&did.numeric_id()),
                Some(f.current_state(did).state)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_publishing_key_gets_distinct_nonces() {
        let f = Fixture::new().await;
        let key = f.kms.create_key(KeyType::Ethereum, None).await.unwrap();
        let publisher = f.publisher_with(f.gateway(Some(key)), 4);
        let mut identities = Vec::new();
        for i in 0..4 {
            let (did, _) = f.identity().await;
            f.claim(&did, &format!("holder-{i}"));
            identities.push(did);
        }
        let (_tx, rx) = running();

        let report = publisher.publish_all(&rx).await.unwrap();
        assert_eq!(report.confirmed, 4);

        let nonces: BTreeSet<u64> = identities
            .iter()
            .map(|did| f.current_state(did).tx_nonce.unwrap())
            .collect();
        assert_eq!(nonces, (0..4).collect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_orphaned_transacted_state_is_resumed_by_hash() {
        let f = Fixture::new().await;
        let crashed = f.publisher(1);
        let (did, _) = f.identity().await;
        f.claim(&did, "alice");
        f.chain.set_include_transactions(false);
        let (tx, rx) = running();

        let task = {
            let publisher = crashed.clone();
            let did = did.clone();
            tokio::spawn(async move { publisher.publish_state(&did, &rx).await })
        };
        while f.chain.accepted_transactions() == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tx.send(true).unwrap();
        assert!(task.await.unwrap().is_err());

        f.chain.set_include_transactions(true);
        let survivor = f.publisher(1);
        let (_tx, rx) = running();
        let report = survivor.check_transacted_states(&rx).await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(f.chain.accepted_transactions(), 1);
        assert_eq!(f.current_state(&did).attempt, 1);
    }
}
