//! # Presale Control
//!
//! Privileged control surface for an on-chain presale. A fixed set of
//! administrator accounts may move the contract through its lifecycle
//! (paused → live → finalized); the contract's authoritative flags are
//! mirrored back to the operator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        LifecycleController                        │
//! │                                                                   │
//! │  AuthorizationGate ──▶ is_active? ──no──▶ offers nothing, no I/O  │
//! │                           │ yes                                   │
//! │                           ▼                                       │
//! │   sync_connection / refresh ──▶ PresaleReader (isLive ∥ isFinal.) │
//! │                                                                   │
//! │   request(r) ──▶ validate ──▶ pending gate ──▶ [finalize prompt]  │
//! │                     │                               │             │
//! │                     ▼                               ▼             │
//! │             Notifier (error)        WalletProvider::signer        │
//! │                                             │                     │
//! │                                             ▼                     │
//! │                           WriterFactory ─▶ PresaleWriter          │
//! │                                             │                     │
//! │                                             ▼                     │
//! │                              PendingTransaction::wait (bounded)   │
//! │                                             │                     │
//! │                     optimistic write ◀──────┘                     │
//! │                     ViewsInvalidated, spawn refresh               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Collaborators
//!
//! Every external dependency is a trait:
//!
//! | Trait | Role | Implementations |
//! |-------|------|-----------------|
//! | [`WalletProvider`] | session, read handle, signer | [`RpcWallet`], [`MockWallet`] |
//! | [`PresaleReader`] | `isLive`, `isFinalized` | [`RpcPresaleReader`], [`MockPresaleContract`] |
//! | [`WriterFactory`] / [`PresaleWriter`] | `setLive`, `finalize` | [`RpcWriterFactory`], [`MockPresaleContract`] |
//! | [`Notifier`] | operator feedback | [`TracingNotifier`], [`MockNotifier`] |
//! | [`ConfirmationPrompt`] | finalize confirmation | [`FixedPrompt`], CLI stdin prompt |
//!
//! # Invariants
//!
//! - Local state changes only on a refresh or a confirmed transaction.
//! - At most one transition is in flight.
//! - Nothing is offered or accepted once the presale is finalized.
//! - `finalize()` is never sent without a separate affirmative answer.

pub mod authorization;
pub mod config;
pub mod contract;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod rpc;
pub mod wallet;

pub use authorization::{AuthorizationGate, AuthorizedSet, CallerIdentity, InvalidAddress, DEFAULT_ADMIN};
pub use config::{ConfigError, ControlConfig};
pub use contract::{
    MockPresaleContract, MockTxOutcome, PendingTransaction, PresaleReader, PresaleWriter,
    TxReceipt, WriterFactory,
};
pub use controller::{
    ControllerEvent, LifecycleController, TransitionOutcome, DEFAULT_CONFIRMATION_TIMEOUT,
    FINALIZE_QUESTION,
};
pub use error::{ChainError, ControlError};
pub use lifecycle::{PresaleLifecycleState, TransitionPhase, TransitionRequest};
pub use notify::{
    ConfirmationPrompt, FixedPrompt, MockNotifier, Notification, NotificationKind, Notifier,
    TracingNotifier,
};
pub use rpc::{JsonRpcClient, RpcPresaleReader, RpcPresaleWriter, RpcWallet, RpcWriterFactory};
pub use wallet::{MockWallet, Signer, WalletProvider};
