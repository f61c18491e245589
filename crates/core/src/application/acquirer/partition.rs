// Domains and acquirees - the acquirer's per-capability bookkeeping
//
// Everything here is only touched while holding the acquirer's lock.

use super::registration::WorkerRegistration;
use crate::domain::{JobPosting, ProvisionerType, Tags};
use crate::error::AppError;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

/// Identity of one acquire call, minted when the call starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AcquireeId(Uuid);

impl AcquireeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AcquireeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A caller waiting for clearance to query the job store
pub(crate) struct Acquiree {
    /// Single-slot channel; sending never blocks the lock holder
    clearance: mpsc::Sender<()>,
    /// Granted clearance, and a store query may be in flight
    pub(crate) in_progress: bool,
    /// A posting arrived mid-query, so retry even if the query found nothing
    pub(crate) pending: bool,
}

impl Acquiree {
    pub(crate) fn new(clearance: mpsc::Sender<()>) -> Self {
        Self {
            clearance,
            in_progress: false,
            pending: false,
        }
    }

    /// Mark in progress and signal the caller
    pub(crate) fn clear(&mut self) {
        self.in_progress = true;
        match self.clearance.try_send(()) {
            Ok(()) => {}
            // caller already returned; its cancel/done will clean up
            Err(TrySendError::Closed(())) => {}
            Err(TrySendError::Full(())) => {
                error!("clearance granted to an acquiree that was already cleared");
            }
        }
    }
}

/// Acquirees sharing one capability set. Only one of them may query the
/// store at a time.
pub(crate) struct Domain {
    organization_id: Uuid,
    provisioner_types: Vec<ProvisionerType>,
    tags: Tags,
    /// Canceled when the domain is removed or the acquirer shuts down;
    /// ends the backup poll loop
    pub(crate) lifetime: CancellationToken,
    pub(crate) acquirees: HashMap<AcquireeId, Acquiree>,
}

impl Domain {
    pub(crate) fn new(registration: &WorkerRegistration, lifetime: CancellationToken) -> Self {
        Self {
            organization_id: registration.organization_id(),
            provisioner_types: registration.provisioner_types().to_vec(),
            tags: registration.tags().clone(),
            lifetime,
            acquirees: HashMap::new(),
        }
    }

    /// Whether the job announced by `posting` could be claimed by this domain
    pub(crate) fn contains(&self, posting: &JobPosting) -> bool {
        // Legacy postings carry no organization; match any
        if !posting.is_legacy() && posting.organization_id != Some(self.organization_id) {
            return false;
        }
        if !self.provisioner_types.contains(&posting.provisioner_type) {
            return false;
        }
        posting.tags.is_subset_of(&self.tags)
    }

    /// Wake one acquiree, or flag the in-progress one to retry.
    ///
    /// The in-progress acquiree is always nominated if there is one, so a
    /// domain never has more than one caller querying.
    pub(crate) fn clear_or_pend(&mut self) {
        let nominee = self
            .acquirees
            .iter()
            .find(|(_, a)| a.in_progress)
            .or_else(|| self.acquirees.iter().next())
            .map(|(id, _)| *id);
        let Some(acquiree) = nominee.and_then(|id| self.acquirees.get_mut(&id)) else {
            return;
        };
        if acquiree.in_progress {
            acquiree.pending = true;
            return;
        }
        acquiree.clear();
    }

    /// Hand query rights to one waiting acquiree, if any
    pub(crate) fn clear_next(&mut self) -> Result<(), AppError> {
        if self.acquirees.values().any(|a| a.in_progress) {
            return Err(invariant_violation(
                "more than one acquiree in progress for same key",
            ));
        }
        if let Some(next) = self.acquirees.values_mut().next() {
            next.clear();
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.acquirees.is_empty()
    }
}

/// Log and build the error for corrupted acquirer state
pub(crate) fn invariant_violation(msg: &str) -> AppError {
    error!(error = msg, "acquirer internal error");
    AppError::Internal(msg.to_string())
}
