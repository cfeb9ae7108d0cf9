//! # Authorization Gate
//!
//! Decides, from the connected account, whether presale controls are
//! exposed at all.
//!
//! ## Normalization
//!
//! Addresses are compared as 20-byte values. Input strings are
//! lowercased before parsing, so `0x432B…` and `0x432b…` are the same
//! identity regardless of EIP-55 checksum casing. The canonical text
//! form is `0x` + 40 lowercase hex digits.
//!
//! ## Reactivity
//!
//! [`AuthorizationGate::watch`] derives a `watch::Receiver<bool>` from
//! the wallet's identity channel. Privilege is recomputed on every
//! connect, disconnect and account switch.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::Address;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Admin address observed on the production deployment.
pub const DEFAULT_ADMIN: &str = "0x432b52a5fafe90f831db31a70381459110f17280";

// ════════════════════════════════════════════════════════════════════════════════
// CALLER IDENTITY
// ════════════════════════════════════════════════════════════════════════════════

/// Address parsing failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid account address: {0:?}")]
pub struct InvalidAddress(pub String);

/// A normalized account address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallerIdentity(Address);

impl CallerIdentity {
    /// Parses a hex address, ignoring case.
    pub fn parse(s: &str) -> Result<Self, InvalidAddress> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let body = lowered.strip_prefix("0x").unwrap_or(&lowered);
        if body.len() != 40 {
            return Err(InvalidAddress(trimmed.to_string()));
        }
        Address::from_str(body)
            .map(Self)
            .map_err(|_| InvalidAddress(trimmed.to_string()))
    }

    /// The raw 20-byte address.
    pub fn address(&self) -> Address {
        self.0
    }

    /// Canonical lowercase `0x`-prefixed form.
    pub fn canonical(&self) -> String {
        format!("0x{}", hex::encode(self.0.as_slice()))
    }
}

impl From<Address> for CallerIdentity {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for CallerIdentity {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// AUTHORIZED SET
// ════════════════════════════════════════════════════════════════════════════════

/// Immutable set of administrator addresses.
///
/// Built once from configuration; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedSet {
    members: HashSet<CallerIdentity>,
}

impl AuthorizedSet {
    /// Builds a set from already-normalized identities.
    pub fn new(members: impl IntoIterator<Item = CallerIdentity>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    /// Parses every entry; fails on the first malformed address.
    pub fn parse<I, S>(entries: I) -> Result<Self, InvalidAddress>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members = entries
            .into_iter()
            .map(|s| CallerIdentity::parse(s.as_ref()))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { members })
    }

    pub fn contains(&self, identity: &CallerIdentity) -> bool {
        self.members.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GATE
// ════════════════════════════════════════════════════════════════════════════════

/// Privilege check over an injected [`AuthorizedSet`].
///
/// Cheap to clone; the set is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct AuthorizationGate {
    admins: Arc<AuthorizedSet>,
}

impl AuthorizationGate {
    pub fn new(admins: AuthorizedSet) -> Self {
        Self {
            admins: Arc::new(admins),
        }
    }

    /// `true` only for a present identity that is in the set.
    pub fn is_privileged(&self, identity: Option<&CallerIdentity>) -> bool {
        match identity {
            Some(id) => self.admins.contains(id),
            None => false,
        }
    }

    /// Derives a privilege stream from an identity stream.
    ///
    /// Spawns a task that lives until either the identity sender or
    /// every privilege receiver is dropped. Must be called inside a
    /// tokio runtime.
    pub fn watch(
        &self,
        mut identity: watch::Receiver<Option<CallerIdentity>>,
    ) -> watch::Receiver<bool> {
        let initial = self.is_privileged(identity.borrow_and_update().as_ref());
        let (tx, rx) = watch::channel(initial);
        let gate = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = identity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *identity.borrow_and_update();
                        let privileged = gate.is_privileged(current.as_ref());
                        debug!(identity = ?current.map(|c| c.canonical()), privileged, "caller identity changed");
                        tx.send_if_modified(|prev| {
                            let modified = *prev != privileged;
                            *prev = privileged;
                            modified
                        });
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0x432B52A5FAFE90F831DB31A70381459110F17280";
    const STRANGER: &str = "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(AuthorizedSet::parse([DEFAULT_ADMIN]).unwrap())
    }

    #[test]
    fn case_variants_are_privileged() {
        let g = gate();
        for s in [MIXED, DEFAULT_ADMIN, "0x432b52a5FAFE90f831db31a70381459110f17280"] {
            let id = CallerIdentity::parse(s).unwrap();
            assert!(g.is_privileged(Some(&id)), "{}", s);
        }
    }

    #[test]
    fn strangers_and_absent_are_not_privileged() {
        let g = gate();
        let id = CallerIdentity::parse(STRANGER).unwrap();
        assert!(!g.is_privileged(Some(&id)));
        assert!(!g.is_privileged(None));
    }

    #[test]
    fn canonical_form_is_lowercase() {
        let id = CallerIdentity::parse(MIXED).unwrap();
        assert_eq!(id.canonical(), DEFAULT_ADMIN);
        assert_eq!(id.to_string(), DEFAULT_ADMIN);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(CallerIdentity::parse("0xDEAD...BEEF").is_err());
        assert!(CallerIdentity::parse("").is_err());
        assert!(CallerIdentity::parse("0x1234").is_err());
        assert!(AuthorizedSet::parse([DEFAULT_ADMIN, "nope"]).is_err());
    }

    #[test]
    fn multiple_admins() {
        let set = AuthorizedSet::parse([DEFAULT_ADMIN, STRANGER]).unwrap();
        assert_eq!(set.len(), 2);
        let g = AuthorizationGate::new(set);
        let id = CallerIdentity::parse(&STRANGER.to_uppercase().replace("0X", "0x")).unwrap();
        assert!(g.is_privileged(Some(&id)));
    }

    #[tokio::test]
    async fn watch_follows_identity_changes() {
        let g = gate();
        let (tx, rx) = watch::channel(None);
        let mut privileged = g.watch(rx);
        assert!(!*privileged.borrow());

        tx.send_replace(Some(CallerIdentity::parse(MIXED).unwrap()));
        privileged.changed().await.unwrap();
        assert!(*privileged.borrow_and_update());

        tx.send_replace(Some(CallerIdentity::parse(STRANGER).unwrap()));
        privileged.changed().await.unwrap();
        assert!(!*privileged.borrow_and_update());

        tx.send_replace(Some(CallerIdentity::parse(DEFAULT_ADMIN).unwrap()));
        privileged.changed().await.unwrap();
        assert!(*privileged.borrow_and_update());

        // Disconnect drops privilege.
        tx.send_replace(None);
        privileged.changed().await.unwrap();
        assert!(!*privileged.borrow_and_update());
    }
}
