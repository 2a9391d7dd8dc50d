//! Registrar-side contact binding store
//!
//! [`RegistrationStore`] maps each address-of-record to its list of
//! contact bindings and is shared by every request-handling thread of a
//! registrar. Structural changes to the map are protected by one
//! short-lived mutex; exclusive multi-operation access to a single AOR's
//! list goes through a logical lock: a set of currently locked AORs plus
//! a condition variable that blocked lockers wait on. This gives
//! at-most-one-holder semantics per AOR without allocating a mutex for
//! every AOR ever seen.
//!
//! Entries are created on first [`lock_record`](RegistrationStore::lock_record)
//! and erased as soon as they are unlocked with an empty binding list, so
//! AORs that are queried but never register do not accumulate.
//!
//! # Examples
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use sipline_registration_core::{Aor, RegistrationStore};
//!
//! let store = RegistrationStore::new();
//! let aor: Aor = "sip:alice@example.com".parse().unwrap();
//! let contact = "sip:alice@192.168.1.10:5060".parse().unwrap();
//!
//! store.update_contact(&aor, &contact, Utc::now() + Duration::seconds(3600), "call-1", None);
//! assert_eq!(store.contacts(&aor).unwrap().len(), 1);
//!
//! store.remove_contact(&aor, &contact);
//! assert!(store.contacts(&aor).is_none());
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use crate::types::{Aor, ContactBinding, ContactUpdate};
use crate::uri::SipUri;

#[derive(Default)]
struct StoreInner {
    records: HashMap<Aor, Vec<ContactBinding>>,
    locked: HashSet<Aor>,
}

/// Concurrent AOR → binding-list store
pub struct RegistrationStore {
    inner: Mutex<StoreInner>,
    released: Condvar,
    check_expiry: bool,
}

impl RegistrationStore {
    /// Store with lazy expiry checking enabled
    pub fn new() -> Self {
        Self::with_expiry_check(true)
    }

    /// Store with lazy expiry checking enabled or disabled. With checking
    /// disabled, reads return bindings past their expiry unchanged.
    pub fn with_expiry_check(check_expiry: bool) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            released: Condvar::new(),
            check_expiry,
        }
    }

    /// Acquire exclusive logical access to an AOR's binding list,
    /// blocking while another caller holds it. An empty entry is
    /// materialized when the AOR is unknown.
    pub fn lock_record(&self, aor: &Aor) {
        let mut inner = self.inner.lock();
        while inner.locked.contains(aor) {
            self.released.wait(&mut inner);
        }
        inner.locked.insert(aor.clone());
        inner.records.entry(aor.clone()).or_default();
        trace!(%aor, "record locked");
    }

    /// Release the logical lock. An entry left with no bindings is erased
    /// from the store entirely.
    pub fn unlock_record(&self, aor: &Aor) {
        let mut inner = self.inner.lock();
        inner.locked.remove(aor);
        if inner.records.get(aor).map_or(false, |list| list.is_empty()) {
            inner.records.remove(aor);
        }
        drop(inner);
        self.released.notify_all();
        trace!(%aor, "record unlocked");
    }

    /// Create or overwrite the binding for `contact` under an implicit
    /// lock/unlock of the AOR.
    ///
    /// Binding identity is decided by URI matching alone; expiry, q-value,
    /// and Call-ID are payload and are overwritten on update.
    pub fn update_contact(
        &self,
        aor: &Aor,
        contact: &SipUri,
        expires_at: DateTime<Utc>,
        call_id: &str,
        q: Option<f32>,
    ) -> ContactUpdate {
        self.lock_record(aor);
        let outcome = {
            let mut inner = self.inner.lock();
            let list = inner.records.entry(aor.clone()).or_default();
            match list.iter_mut().find(|binding| binding.uri.matches(contact)) {
                Some(binding) => {
                    binding.expires_at = expires_at;
                    binding.call_id = call_id.to_string();
                    binding.q = q;
                    ContactUpdate::Updated
                }
                None => {
                    list.push(ContactBinding {
                        uri: contact.clone(),
                        expires_at,
                        q,
                        call_id: call_id.to_string(),
                    });
                    ContactUpdate::Created
                }
            }
        };
        self.unlock_record(aor);
        debug!(%aor, %contact, ?outcome, "contact binding stored");
        outcome
    }

    /// Remove the binding matching `contact` under an implicit
    /// lock/unlock. Idempotent: removing from an unknown AOR or an
    /// unmatched contact is a no-op. Returns whether a binding was
    /// removed. Removing the last binding drops the AOR from the store.
    pub fn remove_contact(&self, aor: &Aor, contact: &SipUri) -> bool {
        self.lock_record(aor);
        let removed = {
            let mut inner = self.inner.lock();
            match inner.records.get_mut(aor) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|binding| !binding.uri.matches(contact));
                    before != list.len()
                }
                None => false,
            }
        };
        self.unlock_record(aor);
        if removed {
            debug!(%aor, %contact, "contact binding removed");
        }
        removed
    }

    /// Unconditionally drop every binding for the AOR
    pub fn remove_aor(&self, aor: &Aor) {
        self.lock_record(aor);
        {
            let mut inner = self.inner.lock();
            if let Some(list) = inner.records.get_mut(aor) {
                list.clear();
            }
        }
        self.unlock_record(aor);
        info!(%aor, "all bindings removed");
    }

    /// Bindings for an AOR, or `None` when the store has no entry for it.
    ///
    /// With expiry checking enabled, bindings past their expiry are purged
    /// before the result is taken.
    pub fn contacts(&self, aor: &Aor) -> Option<Vec<ContactBinding>> {
        let mut inner = self.inner.lock();
        if self.check_expiry {
            Self::sweep(&mut inner, aor);
        }
        inner.records.get(aor).cloned()
    }

    /// All AORs with an entry in the store. With expiry checking enabled,
    /// expired bindings (and the AORs they empty) are purged first.
    pub fn aors(&self) -> Vec<Aor> {
        let mut inner = self.inner.lock();
        if self.check_expiry {
            let known: Vec<Aor> = inner.records.keys().cloned().collect();
            for aor in &known {
                Self::sweep(&mut inner, aor);
            }
        }
        inner.records.keys().cloned().collect()
    }

    /// Lazy expiry sweep for one AOR. Runs under the map mutex; an
    /// unlocked entry emptied by the sweep is dropped.
    fn sweep(inner: &mut StoreInner, aor: &Aor) {
        let now = Utc::now();
        let emptied = match inner.records.get_mut(aor) {
            Some(list) => {
                let before = list.len();
                list.retain(|binding| !binding.is_expired(now));
                if before != list.len() {
                    debug!(%aor, purged = before - list.len(), "purged expired bindings");
                }
                list.is_empty()
            }
            None => false,
        };
        if emptied && !inner.locked.contains(aor) {
            inner.records.remove(aor);
        }
    }
}
