//! # Lifecycle Controller
//!
//! Owns the local view of the presale's lifecycle flags and issues
//! guarded transition requests against the contract.
//!
//! ## State Synchronization
//!
//! [`refresh`](LifecycleController::refresh) reads `isLive` and
//! `isFinalized` concurrently and applies both or neither. Failures are
//! logged and the previous state is kept; there is no retry loop and no
//! polling timer. A read that was started before a confirmed transition
//! and finishes after it is discarded, so it cannot roll the optimistic
//! write back. [`sync_connection`](LifecycleController::sync_connection)
//! triggers a refresh whenever the wallet's read handle changes
//! identity, including the moment the controller becomes active.
//!
//! ## Transition Flow
//!
//! ```text
//! request(r)
//!   │
//!   ├─ session checks      NotConnected / NotAuthorized / WrongNetwork
//!   ├─ pending gate        OperationPending
//!   ├─ precondition        AlreadyFinalized / PreconditionFailed
//!   ├─ finalize prompt     FinalizeDeclined
//!   │
//!   ▼
//! Submitting ──signer──▶ setLive / finalize ──▶ AwaitingConfirmation
//!   │                                               │
//!   │ SignerUnavailable / SubmissionFailed          │ ConfirmationFailed
//!   ▼                                               ▼
//! Rejected ◀────────────────────────────────────────┘
//!                                                   │ receipt
//!                                                   ▼
//!                                               Confirmed
//!                                                   │ optimistic write
//!                                                   │ ViewsInvalidated
//!                                                   │ spawn refresh
//!                                                   ▼
//!                                                 Idle
//! ```
//!
//! Every exit path passes through the pending guard's `Drop`, which
//! releases the gate and returns the phase to `Idle`.
//!
//! ## Concurrency Model
//!
//! State and phase sit behind `parking_lot` locks that are never held
//! across an `.await`. The pending gate is an `AtomicBool`; a second
//! request while one is in flight is refused rather than queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::authorization::AuthorizationGate;
use crate::contract::{PresaleReader, TxReceipt, WriterFactory};
use crate::error::ControlError;
use crate::lifecycle::{PresaleLifecycleState, TransitionPhase, TransitionRequest};
use crate::notify::{ConfirmationPrompt, Notification, Notifier};
use crate::wallet::WalletProvider;

/// Default bound on the confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Question put to the operator before `finalize()`.
pub const FINALIZE_QUESTION: &str =
    "Finalize the presale? This permanently closes it and cannot be undone.";

const EVENT_CAPACITY: usize = 64;

// ════════════════════════════════════════════════════════════════════════════════
// EVENTS & OUTCOMES
// ════════════════════════════════════════════════════════════════════════════════

/// Broadcast to presentation layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The request phase moved.
    PhaseChanged(TransitionPhase),
    /// A refresh applied fresh flags.
    StateRefreshed(PresaleLifecycleState),
    /// A mutation confirmed; every view derived from the contract should
    /// refetch.
    ViewsInvalidated,
}

/// Result of a confirmed transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub request: TransitionRequest,
    pub tx_hash: B256,
    pub block_number: u64,
    /// Local state right after the optimistic write.
    pub state: PresaleLifecycleState,
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTROLLER
// ════════════════════════════════════════════════════════════════════════════════

/// Presale lifecycle controller.
///
/// | Field | Purpose |
/// |-------|---------|
/// | `gate` | privilege check for the connected account |
/// | `wallet` | session, read handle, signer acquisition |
/// | `contracts` | builds a write client from a signer |
/// | `notifier` | operator feedback |
/// | `prompt` | finalize confirmation |
/// | `state` | last known lifecycle flags |
/// | `phase` | where the in-flight request is |
/// | `pending` | single-flight gate |
/// | `epoch` | bumped on every optimistic write; stale reads are dropped |
/// | `connection` | read handle the last refresh was triggered for |
pub struct LifecycleController {
    gate: AuthorizationGate,
    wallet: Arc<dyn WalletProvider>,
    contracts: Arc<dyn WriterFactory>,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn ConfirmationPrompt>,
    confirmation_timeout: Duration,
    state: RwLock<PresaleLifecycleState>,
    phase: Mutex<TransitionPhase>,
    pending: AtomicBool,
    epoch: AtomicU64,
    connection: Mutex<Option<Arc<dyn PresaleReader>>>,
    events: broadcast::Sender<ControllerEvent>,
}

impl LifecycleController {
    pub fn new(
        gate: AuthorizationGate,
        wallet: Arc<dyn WalletProvider>,
        contracts: Arc<dyn WriterFactory>,
        notifier: Arc<dyn Notifier>,
        prompt: Arc<dyn ConfirmationPrompt>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gate,
            wallet,
            contracts,
            notifier,
            prompt,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            state: RwLock::new(PresaleLifecycleState::default()),
            phase: Mutex::new(TransitionPhase::Idle),
            pending: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            connection: Mutex::new(None),
            events,
        }
    }

    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Whether the connected account may see and use the controls.
    pub fn is_active(&self) -> bool {
        self.gate.is_privileged(self.wallet.caller().as_ref())
    }

    pub fn state(&self) -> PresaleLifecycleState {
        *self.state.read()
    }

    pub fn phase(&self) -> TransitionPhase {
        *self.phase.lock()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Controls to show right now. Empty when inactive, finalized, or
    /// while a request is in flight.
    pub fn offered_transitions(&self) -> Vec<TransitionRequest> {
        if !self.is_active() || self.is_pending() {
            return Vec::new();
        }
        self.state().offered_transitions()
    }

    // ── State synchronization ────────────────────────────────────────────

    /// Refreshes if the read handle changed since the last call.
    ///
    /// An inactive controller holds no handle, so becoming active counts
    /// as a change. Returns `true` when a refresh ran and was applied.
    pub async fn sync_connection(&self) -> bool {
        let current = if self.is_active() {
            self.wallet.reader()
        } else {
            None
        };

        let changed = {
            let mut last = self.connection.lock();
            let changed = !same_connection(last.as_ref(), current.as_ref());
            if changed {
                *last = current.clone();
            }
            changed
        };

        match current {
            Some(reader) if changed => {
                debug!("read connection changed, refreshing presale status");
                self.apply_status(reader.as_ref()).await.is_some()
            }
            _ => false,
        }
    }

    /// Best-effort refresh of both lifecycle flags.
    ///
    /// Does nothing while inactive or without a read handle. Returns the
    /// applied state, or `None` if nothing was applied.
    pub async fn refresh(&self) -> Option<PresaleLifecycleState> {
        if !self.is_active() {
            return None;
        }
        let reader = self.wallet.reader()?;
        self.apply_status(reader.as_ref()).await
    }

    async fn apply_status(&self, reader: &dyn PresaleReader) -> Option<PresaleLifecycleState> {
        let started = self.epoch.load(Ordering::SeqCst);
        match fetch_status(reader).await {
            Ok(fresh) => {
                {
                    let mut guard = self.state.write();
                    if self.epoch.load(Ordering::SeqCst) != started {
                        debug!(state = %fresh, "discarding status read that predates a confirmed transition");
                        return None;
                    }
                    *guard = fresh;
                }
                debug!(state = %fresh, "presale status refreshed");
                self.emit(ControllerEvent::StateRefreshed(fresh));
                Some(fresh)
            }
            Err(err) => {
                warn!(error = %err, "presale status read failed, keeping previous state");
                None
            }
        }
    }

    // ── Transition issuance ──────────────────────────────────────────────

    /// Validates, submits and confirms one lifecycle transition.
    ///
    /// On success the local state already reflects the transition and a
    /// reconciling refresh has been spawned. On failure local state is
    /// untouched and the reason has been sent to the notifier.
    pub async fn request(
        self: &Arc<Self>,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, ControlError> {
        info!(%request, "presale transition requested");
        let result = self.execute(request).await;

        if let Err(err) = &result {
            warn!(%request, error = %err, "presale transition abandoned");
            if err.is_user_visible() {
                self.notifier.notify(Notification::error(err.to_string()));
            }
        }
        result
    }

    async fn execute(
        self: &Arc<Self>,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, ControlError> {
        self.check_session()?;
        let _guard = self.begin()?;
        self.state().check(request)?;

        if request.is_destructive() && !self.prompt.confirm(FINALIZE_QUESTION) {
            return Err(ControlError::FinalizeDeclined);
        }

        self.notifier.notify(Notification::info(request.starting_message()));

        let receipt = match self.submit_and_confirm(request).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.set_phase(TransitionPhase::Rejected);
                return Err(err);
            }
        };

        let state = {
            let mut guard = self.state.write();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *guard = guard.apply(request);
            *guard
        };
        info!(
            %request,
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            state = %state,
            "presale transition confirmed"
        );
        self.set_phase(TransitionPhase::Confirmed);
        self.emit(ControllerEvent::ViewsInvalidated);
        self.notifier.notify(Notification::success(request.success_message()));
        self.schedule_refresh();

        Ok(TransitionOutcome {
            request,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            state,
        })
    }

    fn check_session(&self) -> Result<(), ControlError> {
        let caller = self.wallet.caller().ok_or(ControlError::NotConnected)?;
        if !self.gate.is_privileged(Some(&caller)) {
            return Err(ControlError::NotAuthorized);
        }
        if !self.wallet.is_correct_network() {
            return Err(ControlError::WrongNetwork);
        }
        Ok(())
    }

    fn begin(&self) -> Result<PendingGuard<'_>, ControlError> {
        self.pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ControlError::OperationPending)?;
        Ok(PendingGuard { controller: self })
    }

    async fn submit_and_confirm(&self, request: TransitionRequest) -> Result<TxReceipt, ControlError> {
        self.set_phase(TransitionPhase::Submitting);

        let signer = self
            .wallet
            .signer()
            .await
            .map_err(ControlError::SignerUnavailable)?;
        let writer = self.contracts.connect(signer);

        let tx = match request {
            TransitionRequest::SetLive(live) => writer.set_live(live).await,
            TransitionRequest::Finalize => writer.finalize().await,
        }
        .map_err(ControlError::SubmissionFailed)?;

        info!(%request, tx_hash = %tx.tx_hash(), "presale transaction submitted");
        self.set_phase(TransitionPhase::AwaitingConfirmation);

        match tokio::time::timeout(self.confirmation_timeout, tx.wait_for_confirmation()).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(err)) => Err(ControlError::ConfirmationFailed(err.to_string())),
            Err(_) => Err(ControlError::ConfirmationFailed(format!(
                "no confirmation within {:?}",
                self.confirmation_timeout
            ))),
        }
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.refresh().await;
        });
    }

    fn set_phase(&self, phase: TransitionPhase) {
        *self.phase.lock() = phase;
        debug!(?phase, "transition phase");
        self.emit(ControllerEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Releases the single-flight gate on every exit path.
struct PendingGuard<'a> {
    controller: &'a LifecycleController,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.controller.set_phase(TransitionPhase::Idle);
        self.controller.pending.store(false, Ordering::SeqCst);
    }
}

/// Reads both flags concurrently; both-or-neither.
async fn fetch_status(reader: &dyn PresaleReader) -> Result<PresaleLifecycleState, ControlError> {
    let (live, finalized) = tokio::try_join!(reader.is_live(), reader.is_finalized())
        .map_err(ControlError::StatusReadFailed)?;
    Ok(PresaleLifecycleState { live, finalized })
}

fn same_connection(
    a: Option<&Arc<dyn PresaleReader>>,
    b: Option<&Arc<dyn PresaleReader>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
        (None, None) => true,
        _ => false,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<LifecycleController>();
    }
    let _ = check;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{AuthorizedSet, CallerIdentity, DEFAULT_ADMIN};
    use crate::contract::{MockPresaleContract, MockTxOutcome};
    use crate::error::ChainError;
    use crate::notify::{FixedPrompt, MockNotifier, NotificationKind};
    use crate::wallet::MockWallet;

    struct Harness {
        controller: Arc<LifecycleController>,
        contract: MockPresaleContract,
        wallet: Arc<MockWallet>,
        notifier: Arc<MockNotifier>,
    }

    fn admin() -> CallerIdentity {
        CallerIdentity::parse(DEFAULT_ADMIN).unwrap()
    }

    fn harness(remote: PresaleLifecycleState) -> Harness {
        let contract = MockPresaleContract::new(remote);
        let wallet = Arc::new(MockWallet::connected(admin(), Arc::new(contract.clone())));
        let notifier = Arc::new(MockNotifier::new());
        let controller = Arc::new(LifecycleController::new(
            AuthorizationGate::new(AuthorizedSet::new([admin()])),
            wallet.clone(),
            Arc::new(contract.clone()),
            notifier.clone(),
            Arc::new(FixedPrompt::accept()),
        ));
        Harness {
            controller,
            contract,
            wallet,
            notifier,
        }
    }

    #[tokio::test]
    async fn refresh_applies_both_flags() {
        let h = harness(PresaleLifecycleState::new(true, false));
        assert_eq!(h.controller.refresh().await, Some(PresaleLifecycleState::new(true, false)));
        assert_eq!(h.controller.state(), PresaleLifecycleState::new(true, false));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_state() {
        let h = harness(PresaleLifecycleState::new(true, false));
        h.controller.refresh().await;

        h.contract.set_remote(PresaleLifecycleState::new(false, true));
        h.contract.fail_reads(Some(ChainError::MalformedResponse("0x".into())));
        assert_eq!(h.controller.refresh().await, None);
        assert_eq!(h.controller.state(), PresaleLifecycleState::new(true, false));
        // Silent: no notification for read failures.
        assert!(h.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn sync_connection_only_on_identity_change() {
        let h = harness(PresaleLifecycleState::default());
        assert!(h.controller.sync_connection().await);
        assert!(!h.controller.sync_connection().await);
        assert_eq!(h.contract.read_count(), 2);

        // Reconnect with a new handle to the same contract.
        h.wallet.set_reader(Some(Arc::new(h.contract.clone())));
        assert!(h.controller.sync_connection().await);
        assert_eq!(h.contract.read_count(), 4);
    }

    #[tokio::test]
    async fn inactive_controller_never_reads() {
        let h = harness(PresaleLifecycleState::default());
        h.wallet.set_caller(None);
        assert!(!h.controller.sync_connection().await);
        assert_eq!(h.controller.refresh().await, None);
        assert!(h.controller.offered_transitions().is_empty());
        assert_eq!(h.contract.read_count(), 0);

        // Becoming active is a mount.
        h.wallet.set_caller(Some(admin()));
        assert!(h.controller.sync_connection().await);
        assert_eq!(h.contract.read_count(), 2);
    }

    #[tokio::test]
    async fn pending_guard_released_after_failure() {
        let h = harness(PresaleLifecycleState::default());
        h.contract.push_outcome(MockTxOutcome::Revert("paused by owner".into()));

        let err = h.controller.request(TransitionRequest::SetLive(true)).await;
        assert!(matches!(err, Err(ControlError::ConfirmationFailed(_))));
        assert!(!h.controller.is_pending());
        assert_eq!(h.controller.phase(), TransitionPhase::Idle);

        let ok = h.controller.request(TransitionRequest::SetLive(true)).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn confirmation_timeout_is_enforced() {
        let contract = MockPresaleContract::default();
        contract.push_outcome(MockTxOutcome::Hang);
        let controller = Arc::new(
            LifecycleController::new(
                AuthorizationGate::new(AuthorizedSet::new([admin()])),
                Arc::new(MockWallet::connected(admin(), Arc::new(contract.clone()))),
                Arc::new(contract.clone()),
                Arc::new(MockNotifier::new()),
                Arc::new(FixedPrompt::accept()),
            )
            .with_confirmation_timeout(Duration::from_millis(20)),
        );

        let result = controller.request(TransitionRequest::SetLive(true)).await;
        match result {
            Err(ControlError::ConfirmationFailed(msg)) => {
                assert_eq!(msg, "no confirmation within 20ms")
            }
            other => panic!("expected ConfirmationFailed, got {:?}", other),
        }
        assert_eq!(controller.state(), PresaleLifecycleState::default());
        assert!(!controller.is_pending());
    }

    #[tokio::test]
    async fn success_emits_info_then_success() {
        let h = harness(PresaleLifecycleState::default());
        h.controller.request(TransitionRequest::SetLive(true)).await.unwrap();
        assert_eq!(
            h.notifier.kinds(),
            vec![NotificationKind::Info, NotificationKind::Success]
        );
    }

    #[test]
    fn same_connection_compares_identity() {
        let a: Arc<dyn PresaleReader> = Arc::new(MockPresaleContract::default());
        let b: Arc<dyn PresaleReader> = Arc::new(MockPresaleContract::default());
        assert!(same_connection(Some(&a), Some(&a.clone())));
        assert!(!same_connection(Some(&a), Some(&b)));
        assert!(!same_connection(Some(&a), None));
        assert!(same_connection(None, None));
    }
}
