//! Background pour proving.
//!
//! Groth16 proving is CPU bound and takes seconds, so it runs on a dedicated
//! thread outside the tokio runtime. Callers hand a request over a channel
//! and await the reply.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use dotcoin_privacy::{ShieldedCoin, SpendingKey};
use dotcoin_prover::{OldCoinOpening, POUR_OUTPUTS, PourProof, ProofError, ProofService};

/// Queued requests before `prove` starts waiting for capacity.
const QUEUE_DEPTH: usize = 32;

/// Request to prove a pour
pub struct ProveRequest {
    pub spending_key: SpendingKey,
    pub old: OldCoinOpening,
    pub new_coins: [ShieldedCoin; POUR_OUTPUTS],
    /// Checked once the request reaches the front of the queue
    pub cancel: Option<CancellationToken>,
    pub reply: oneshot::Sender<Result<PourProof, ProofError>>,
}

/// Async front end to a [`ProofService`].
#[derive(Clone)]
pub struct ProvingService {
    request_tx: mpsc::Sender<ProveRequest>,
}

impl ProvingService {
    /// Starts the proving thread. It exits once every handle is dropped.
    pub fn start(prover: Arc<dyn ProofService>) -> Self {
        let (request_tx, mut request_rx) = mpsc::channel::<ProveRequest>(QUEUE_DEPTH);

        std::thread::spawn(move || {
            while let Some(request) = request_rx.blocking_recv() {
                if request.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                    debug!("Skipping cancelled pour proof");
                    let _ = request.reply.send(Err(ProofError::Cancelled));
                    continue;
                }
                let result =
                    prover.build_proof(&request.spending_key, &request.old, request.new_coins);
                let _ = request.reply.send(result);
            }
            info!("Proving service stopped");
        });

        Self { request_tx }
    }

    /// Queues a pour proof and waits for it.
    pub async fn prove(
        &self,
        spending_key: SpendingKey,
        old: OldCoinOpening,
        new_coins: [ShieldedCoin; POUR_OUTPUTS],
        cancel: Option<CancellationToken>,
    ) -> Result<PourProof, ProofError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.request_tx
            .send(ProveRequest {
                spending_key,
                old,
                new_coins,
                cancel,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ProofError::Unavailable)?;

        reply_rx.await.map_err(|_| ProofError::Cancelled)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotcoin_privacy::{NoteCommitmentTree, create_shielded_coin};
    use dotcoin_prover::MockProofService;
    use rand::rngs::OsRng;

    fn pour_witness() -> (SpendingKey, OldCoinOpening, [ShieldedCoin; POUR_OUTPUTS]) {
        let key = SpendingKey::random(&mut OsRng);
        let (old, _) = create_shielded_coin(50, key.public_key());
        let mut tree = NoteCommitmentTree::new();
        tree.insert(&old.commitment()).unwrap();
        let membership = tree.prove_membership(&old.commitment()).unwrap();

        let apk = key.public_key();
        let new_coins = [
            ShieldedCoin::new(20, apk, &mut OsRng),
            ShieldedCoin::new(30, apk, &mut OsRng),
        ];
        (key, OldCoinOpening { coin: old, membership }, new_coins)
    }

    #[tokio::test]
    async fn test_proves_on_background_thread() {
        let service = ProvingService::start(Arc::new(MockProofService));
        let (key, old, new_coins) = pour_witness();
        let expected_cm = new_coins[0].cm;

        let proof = service.prove(key, old, new_coins, None).await.unwrap();
        assert_eq!(proof.public.outputs[0].cm, expected_cm);
        assert!(
            MockProofService
                .verify_proof(&proof.public, &proof.proof)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_cancelled_request_is_skipped() {
        let service = ProvingService::start(Arc::new(MockProofService));
        let (key, old, new_coins) = pour_witness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service.prove(key, old, new_coins, Some(cancel)).await;
        assert!(matches!(result, Err(ProofError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_witness_is_reported() {
        let service = ProvingService::start(Arc::new(MockProofService));
        let (key, old, mut new_coins) = pour_witness();
        new_coins[1] = ShieldedCoin::new(31, key.public_key(), &mut OsRng);

        let result = service.prove(key, old, new_coins, None).await;
        assert!(result.is_err());
    }
}
