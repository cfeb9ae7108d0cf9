//! # Wallet Provider
//!
//! The wallet collaborator owns the session: which account is
//! connected, whether it is on the right chain, the read-only contract
//! handle, and signer acquisition.
//!
//! Everything except signer acquisition is a synchronous snapshot of
//! the session; the provider updates it on connect, disconnect and
//! network switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authorization::CallerIdentity;
use crate::contract::PresaleReader;
use crate::error::ChainError;

// ════════════════════════════════════════════════════════════════════════════════
// SIGNER
// ════════════════════════════════════════════════════════════════════════════════

/// Capability to sign transactions for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signer {
    account: CallerIdentity,
}

impl Signer {
    pub fn new(account: CallerIdentity) -> Self {
        Self { account }
    }

    pub fn account(&self) -> CallerIdentity {
        self.account
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// PROVIDER TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Session state exposed by the wallet connection.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Connected account, `None` when disconnected.
    fn caller(&self) -> Option<CallerIdentity>;

    /// Whether the session is on the presale's chain.
    fn is_correct_network(&self) -> bool;

    /// Read-only contract handle. A new `Arc` means a new connection.
    fn reader(&self) -> Option<Arc<dyn PresaleReader>>;

    /// Acquires a signing capability for the connected account.
    async fn signer(&self) -> Result<Signer, ChainError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// MOCK WALLET
// ════════════════════════════════════════════════════════════════════════════════

/// Scriptable wallet session for tests.
///
/// Starts disconnected, on the correct network, with no reader.
pub struct MockWallet {
    caller: Mutex<Option<CallerIdentity>>,
    correct_network: AtomicBool,
    reader: Mutex<Option<Arc<dyn PresaleReader>>>,
    signer_failure: Mutex<Option<ChainError>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            caller: Mutex::new(None),
            correct_network: AtomicBool::new(true),
            reader: Mutex::new(None),
            signer_failure: Mutex::new(None),
        }
    }

    /// Connected session for `caller` reading through `reader`.
    pub fn connected(caller: CallerIdentity, reader: Arc<dyn PresaleReader>) -> Self {
        let wallet = Self::new();
        wallet.set_caller(Some(caller));
        wallet.set_reader(Some(reader));
        wallet
    }

    pub fn set_caller(&self, caller: Option<CallerIdentity>) {
        *self.caller.lock() = caller;
    }

    pub fn set_correct_network(&self, correct: bool) {
        self.correct_network.store(correct, Ordering::SeqCst);
    }

    pub fn set_reader(&self, reader: Option<Arc<dyn PresaleReader>>) {
        *self.reader.lock() = reader;
    }

    /// Makes signer acquisition fail until cleared with `None`.
    pub fn fail_signer(&self, error: Option<ChainError>) {
        *self.signer_failure.lock() = error;
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn caller(&self) -> Option<CallerIdentity> {
        *self.caller.lock()
    }

    fn is_correct_network(&self) -> bool {
        self.correct_network.load(Ordering::SeqCst)
    }

    fn reader(&self) -> Option<Arc<dyn PresaleReader>> {
        self.reader.lock().clone()
    }

    async fn signer(&self) -> Result<Signer, ChainError> {
        if let Some(err) = self.signer_failure.lock().clone() {
            return Err(err);
        }
        match self.caller() {
            Some(account) => Ok(Signer::new(account)),
            None => Err(ChainError::NoSigner("wallet disconnected".to_string())),
        }
    }
}
