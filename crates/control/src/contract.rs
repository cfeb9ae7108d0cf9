//! # Presale Contract Collaborators
//!
//! Trait-abstracted access to the remote presale contract. The
//! controller never talks to a chain client directly.
//!
//! ## Architecture
//!
//! ```text
//! WalletProvider::reader() ──▶ Arc<dyn PresaleReader>     (isLive / isFinalized)
//!
//! WalletProvider::signer() ──▶ Signer
//!                                │
//!                                ▼
//!                 WriterFactory::connect(signer)
//!                                │
//!                                ▼
//!                   Arc<dyn PresaleWriter>               (setLive / finalize)
//!                                │
//!                                ▼
//!                   Box<dyn PendingTransaction>          (wait_for_confirmation)
//! ```
//!
//! The read client is injected pre-constructed. A write client only
//! exists once a signer has been obtained.
//!
//! ## Contract
//!
//! - Implementations MUST NOT retry internally.
//! - A reverted transaction MUST surface as `ChainError::Reverted`
//!   from `wait_for_confirmation`, never as `Ok`.
//! - All types are `Send + Sync`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ChainError;
use crate::lifecycle::{PresaleLifecycleState, TransitionRequest};
use crate::wallet::Signer;

// ════════════════════════════════════════════════════════════════════════════════
// TRAITS
// ════════════════════════════════════════════════════════════════════════════════

/// Read side of the contract.
#[async_trait]
pub trait PresaleReader: Send + Sync {
    async fn is_live(&self) -> Result<bool, ChainError>;

    async fn is_finalized(&self) -> Result<bool, ChainError>;
}

/// Inclusion proof for a confirmed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// A submitted transaction that has not been confirmed yet.
#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn tx_hash(&self) -> B256;

    /// Resolves once the network has included the transaction.
    ///
    /// No deadline is imposed here; callers bound the wait.
    async fn wait_for_confirmation(&self) -> Result<TxReceipt, ChainError>;
}

/// Write side of the contract, bound to one signer.
#[async_trait]
pub trait PresaleWriter: Send + Sync {
    async fn set_live(&self, live: bool) -> Result<Box<dyn PendingTransaction>, ChainError>;

    async fn finalize(&self) -> Result<Box<dyn PendingTransaction>, ChainError>;
}

/// Produces a write client once a signer is available.
pub trait WriterFactory: Send + Sync {
    fn connect(&self, signer: Signer) -> Arc<dyn PresaleWriter>;
}

// ════════════════════════════════════════════════════════════════════════════════
// MOCK CONTRACT
// ════════════════════════════════════════════════════════════════════════════════

/// How a mock transaction behaves once submitted.
#[derive(Clone, Debug)]
pub enum MockTxOutcome {
    /// Confirms immediately and updates the mock's remote state.
    Confirm,
    /// Fails confirmation with `ChainError::Reverted`.
    Revert(String),
    /// Fails confirmation with `ChainError::Dropped`.
    Drop(String),
    /// Waits on the `Notify`, then confirms.
    Hold(Arc<Notify>),
    /// Never resolves.
    Hang,
}

struct MockInner {
    remote: Mutex<PresaleLifecycleState>,
    read_failure: Mutex<Option<ChainError>>,
    submit_failures: Mutex<Vec<ChainError>>,
    outcomes: Mutex<Vec<MockTxOutcome>>,
    submitted: Mutex<Vec<TransitionRequest>>,
    signers: Mutex<Vec<Signer>>,
    reads: AtomicUsize,
    nonce: AtomicUsize,
}

/// In-memory presale contract for tests and dry runs.
///
/// Holds the "remote" lifecycle flags. Scripted submit failures and
/// transaction outcomes are consumed FIFO; with nothing scripted every
/// submission succeeds and confirms.
///
/// Cloning yields another handle to the same contract.
#[derive(Clone)]
pub struct MockPresaleContract {
    inner: Arc<MockInner>,
}

impl MockPresaleContract {
    pub fn new(remote: PresaleLifecycleState) -> Self {
        Self {
            inner: Arc::new(MockInner {
                remote: Mutex::new(remote),
                read_failure: Mutex::new(None),
                submit_failures: Mutex::new(Vec::new()),
                outcomes: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
                signers: Mutex::new(Vec::new()),
                reads: AtomicUsize::new(0),
                nonce: AtomicUsize::new(0),
            }),
        }
    }

    /// Current remote flags.
    pub fn remote(&self) -> PresaleLifecycleState {
        *self.inner.remote.lock()
    }

    /// Overwrites the remote flags, as another operator would.
    pub fn set_remote(&self, state: PresaleLifecycleState) {
        *self.inner.remote.lock() = state;
    }

    /// Makes every subsequent read fail until cleared with `None`.
    pub fn fail_reads(&self, error: Option<ChainError>) {
        *self.inner.read_failure.lock() = error;
    }

    /// Queues a rejection for the next submission.
    pub fn push_submit_failure(&self, error: ChainError) {
        self.inner.submit_failures.lock().push(error);
    }

    /// Queues the outcome of the next successful submission.
    pub fn push_outcome(&self, outcome: MockTxOutcome) {
        self.inner.outcomes.lock().push(outcome);
    }

    /// Every transition that reached the contract, in order.
    pub fn submitted(&self) -> Vec<TransitionRequest> {
        self.inner.submitted.lock().clone()
    }

    /// Signers write clients were built for.
    pub fn signers(&self) -> Vec<Signer> {
        self.inner.signers.lock().clone()
    }

    /// Number of individual flag reads served (including failed ones).
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    fn read_flag(&self, pick: fn(&PresaleLifecycleState) -> bool) -> Result<bool, ChainError> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.read_failure.lock().clone() {
            return Err(err);
        }
        Ok(pick(&self.inner.remote.lock()))
    }

    fn submit(&self, request: TransitionRequest) -> Result<Box<dyn PendingTransaction>, ChainError> {
        {
            let mut failures = self.inner.submit_failures.lock();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        self.inner.submitted.lock().push(request);

        let outcome = {
            let mut queue = self.inner.outcomes.lock();
            if queue.is_empty() {
                MockTxOutcome::Confirm
            } else {
                queue.remove(0)
            }
        };

        let n = self.inner.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockPendingTransaction {
            contract: self.clone(),
            request,
            outcome,
            tx_hash: B256::with_last_byte(n as u8),
            block_number: n as u64,
        }))
    }
}

impl Default for MockPresaleContract {
    fn default() -> Self {
        Self::new(PresaleLifecycleState::default())
    }
}

#[async_trait]
impl PresaleReader for MockPresaleContract {
    async fn is_live(&self) -> Result<bool, ChainError> {
        self.read_flag(|s| s.live)
    }

    async fn is_finalized(&self) -> Result<bool, ChainError> {
        self.read_flag(|s| s.finalized)
    }
}

#[async_trait]
impl PresaleWriter for MockPresaleContract {
    async fn set_live(&self, live: bool) -> Result<Box<dyn PendingTransaction>, ChainError> {
        self.submit(TransitionRequest::SetLive(live))
    }

    async fn finalize(&self) -> Result<Box<dyn PendingTransaction>, ChainError> {
        self.submit(TransitionRequest::Finalize)
    }
}

impl WriterFactory for MockPresaleContract {
    fn connect(&self, signer: Signer) -> Arc<dyn PresaleWriter> {
        self.inner.signers.lock().push(signer);
        Arc::new(self.clone())
    }
}

struct MockPendingTransaction {
    contract: MockPresaleContract,
    request: TransitionRequest,
    outcome: MockTxOutcome,
    tx_hash: B256,
    block_number: u64,
}

impl MockPendingTransaction {
    fn confirm(&self) -> TxReceipt {
        let mut remote = self.contract.inner.remote.lock();
        *remote = remote.apply(self.request);
        TxReceipt {
            tx_hash: self.tx_hash,
            block_number: self.block_number,
        }
    }
}

#[async_trait]
impl PendingTransaction for MockPendingTransaction {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait_for_confirmation(&self) -> Result<TxReceipt, ChainError> {
        match &self.outcome {
            MockTxOutcome::Confirm => Ok(self.confirm()),
            MockTxOutcome::Revert(reason) => Err(ChainError::Reverted(reason.clone())),
            MockTxOutcome::Drop(reason) => Err(ChainError::Dropped(reason.clone())),
            MockTxOutcome::Hold(release) => {
                release.notified().await;
                Ok(self.confirm())
            }
            MockTxOutcome::Hang => std::future::pending().await,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<MockPresaleContract>();
        assert_send_sync::<MockPendingTransaction>();
    }
    let _ = check;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{CallerIdentity, DEFAULT_ADMIN};

    fn signer() -> Signer {
        Signer::new(CallerIdentity::parse(DEFAULT_ADMIN).unwrap())
    }

    #[tokio::test]
    async fn reads_reflect_remote_state() {
        let mock = MockPresaleContract::new(PresaleLifecycleState::new(true, false));
        assert_eq!(mock.is_live().await, Ok(true));
        assert_eq!(mock.is_finalized().await, Ok(false));
        assert_eq!(mock.read_count(), 2);
    }

    #[tokio::test]
    async fn read_failure_until_cleared() {
        let mock = MockPresaleContract::default();
        mock.fail_reads(Some(ChainError::Network("down".into())));
        assert!(mock.is_live().await.is_err());
        mock.fail_reads(None);
        assert_eq!(mock.is_live().await, Ok(false));
    }

    #[tokio::test]
    async fn confirmed_submission_updates_remote() {
        let mock = MockPresaleContract::default();
        let writer = mock.connect(signer());
        let tx = writer.set_live(true).await.unwrap();
        let receipt = tx.wait_for_confirmation().await.unwrap();
        assert_eq!(receipt.tx_hash, tx.tx_hash());
        assert!(mock.remote().live);
        assert_eq!(mock.submitted(), vec![TransitionRequest::SetLive(true)]);
        assert_eq!(mock.signers(), vec![signer()]);
    }

    #[tokio::test]
    async fn scripted_failures_are_fifo() {
        let mock = MockPresaleContract::default();
        mock.push_submit_failure(ChainError::UserDeclined);
        mock.push_outcome(MockTxOutcome::Revert("not owner".into()));
        let writer = mock.connect(signer());

        assert!(matches!(writer.finalize().await, Err(ChainError::UserDeclined)));

        let tx = writer.finalize().await.unwrap();
        assert_eq!(
            tx.wait_for_confirmation().await,
            Err(ChainError::Reverted("not owner".into()))
        );
        assert!(!mock.remote().finalized);

        let tx = writer.finalize().await.unwrap();
        assert!(tx.wait_for_confirmation().await.is_ok());
        assert!(mock.remote().finalized);
    }
}
