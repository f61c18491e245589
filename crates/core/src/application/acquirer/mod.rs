// Acquirer - coordinates provisioner daemons pulling jobs from the store
//
// Workers with identical capabilities share a Domain. Within a Domain only
// one acquire call at a time may query the job store; the others wait for
// clearance, which comes from a job posting on the pubsub, from the Domain's
// backup poll, or from the previous caller finishing.

pub mod config;
mod partition;
mod registration;

pub use config::{AcquirerConfig, DEFAULT_ACQUIRE_JOB_LONG_POLL, DEFAULT_BACKUP_POLL_INTERVAL};
pub use registration::WorkerRegistration;

use crate::application::retry::ExponentialBackoff;
use crate::domain::{DomainKey, JobPosting, ProvisionerJob, EVENT_JOB_POSTED};
use crate::error::{AppError, Result};
use crate::port::{AcquireJobParams, JobStore, ListenerWithErr, Pubsub, PubsubError, TimeProvider};
use partition::{invariant_violation, Acquiree, AcquireeId, Domain};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Job acquisition coordinator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Acquirer {
    inner: Arc<Inner>,
}

struct Inner {
    /// Coordinator-wide lifetime; parent of every Domain lifetime
    lifetime: CancellationToken,
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    config: AcquirerConfig,
    domains: Mutex<HashMap<DomainKey, Domain>>,
}

impl Acquirer {
    /// Create an acquirer and subscribe it to job postings.
    ///
    /// Returns once the subscription is established, or once `lifetime` is
    /// canceled. Canceling `lifetime` later drops the subscription and stops
    /// every Domain's backup poll.
    pub async fn new(
        lifetime: CancellationToken,
        store: Arc<dyn JobStore>,
        pubsub: Arc<dyn Pubsub>,
        time_provider: Arc<dyn TimeProvider>,
        config: AcquirerConfig,
    ) -> Self {
        let backoff =
            ExponentialBackoff::new(config.subscribe_initial_backoff, config.subscribe_max_backoff);
        let inner = Arc::new(Inner {
            lifetime: lifetime.clone(),
            store,
            time_provider,
            config,
            domains: Mutex::new(HashMap::new()),
        });

        let (subscribed_tx, subscribed_rx) = oneshot::channel();
        tokio::spawn(subscribe(
            Arc::downgrade(&inner),
            pubsub,
            lifetime,
            backoff,
            subscribed_tx,
        ));
        // Err means the lifetime ended before subscribing
        let _ = subscribed_rx.await;

        Self { inner }
    }

    /// Acquire a job with one of the registration's provisioner types and
    /// compatible tags.
    ///
    /// Blocks until a job is acquired, `ctx` is canceled, or the store fails
    /// with something other than "no job available".
    pub async fn acquire_job(
        &self,
        ctx: &CancellationToken,
        registration: &WorkerRegistration,
    ) -> Result<ProvisionerJob> {
        let canceled = async {
            ctx.cancelled().await;
            AppError::Canceled
        };
        self.acquire_until(registration, canceled)
            .instrument(acquire_span(registration))
            .await
    }

    /// Long-poll variant of [`Acquirer::acquire_job`]: `Ok(None)` when
    /// `timeout` passes without a job.
    pub async fn acquire_job_with_timeout(
        &self,
        ctx: &CancellationToken,
        timeout: Duration,
        registration: &WorkerRegistration,
    ) -> Result<Option<ProvisionerJob>> {
        let deadline = async {
            tokio::select! {
                _ = ctx.cancelled() => AppError::Canceled,
                _ = sleep(timeout) => AppError::DeadlineExceeded,
            }
        };
        match self
            .acquire_until(registration, deadline)
            .instrument(acquire_span(registration))
            .await
        {
            Ok(job) => Ok(Some(job)),
            Err(AppError::DeadlineExceeded) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of Domains with at least one waiting acquire call
    pub fn active_domains(&self) -> usize {
        self.inner.lock_domains().len()
    }

    async fn acquire_until<F>(
        &self,
        registration: &WorkerRegistration,
        done: F,
    ) -> Result<ProvisionerJob>
    where
        F: Future<Output = AppError>,
    {
        debug!("acquiring job");
        tokio::pin!(done);
        // one slot, so clearance is never sent while a signal is unread
        let (clearance_tx, mut clearance_rx) = mpsc::channel(1);
        let mut acquiree = Registered::new(&self.inner, registration.domain_key().clone());

        loop {
            self.inner.want(registration, acquiree.id, &clearance_tx);
            tokio::select! {
                biased;
                err = &mut done => {
                    debug!(error = %err, "acquiring job canceled");
                    // internal errors take precedence
                    acquiree.cancel()?;
                    return Err(err);
                }
                Some(()) = clearance_rx.recv() => {}
            }

            debug!("got clearance to call job store");
            let params = AcquireJobParams {
                organization_id: registration.organization_id(),
                worker_id: registration.worker_id(),
                started_at: self.inner.time_provider.now_millis(),
                types: registration.provisioner_types().to_vec(),
                provisioner_tags: registration.tags_json().to_string(),
            };
            // an abandoned query is dropped; a claim it already committed stays started
            let result = tokio::select! {
                biased;
                err = &mut done => {
                    debug!(error = %err, "acquiring job canceled during job store query");
                    acquiree.cancel()?;
                    return Err(err);
                }
                result = self.inner.store.acquire_provisioner_job(params) => result,
            };
            let result = match result {
                Ok(None) => {
                    debug!("no job available");
                    continue;
                }
                Ok(Some(job)) => Ok(job),
                Err(e) => Err(e),
            };

            // not retrying, so hand clearance on
            acquiree.done()?;
            return match result {
                Ok(job) => {
                    debug!(job_id = %job.id, "successfully acquired job");
                    Ok(job)
                }
                Err(e) => {
                    warn!(error = %e, "error attempting to acquire job");
                    Err(AppError::AcquireFailed(Box::new(e)))
                }
            };
        }
    }
}

impl Inner {
    fn lock_domains(&self) -> MutexGuard<'_, HashMap<DomainKey, Domain>> {
        // critical sections never panic, so a poisoned map is still consistent
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in clearance for `id`
    fn want(
        self: &Arc<Self>,
        registration: &WorkerRegistration,
        id: AcquireeId,
        clearance: &mpsc::Sender<()>,
    ) {
        let mut domains = self.lock_domains();
        let mut cleared = false;
        let domain = match domains.entry(registration.domain_key().clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let lifetime = self.lifetime.child_token();
                tokio::spawn(poll(
                    Arc::clone(self),
                    entry.key().clone(),
                    lifetime.clone(),
                ));
                // first caller for this key, nobody to contend with
                cleared = true;
                entry.insert(Domain::new(registration, lifetime))
            }
        };

        let acquiree = domain
            .acquirees
            .entry(id)
            .or_insert_with(|| Acquiree::new(clearance.clone()));
        // a posting arrived while this caller was querying
        if acquiree.pending {
            cleared = true;
            acquiree.pending = false;
        }
        acquiree.in_progress = cleared;
        if cleared {
            acquiree.clear();
        }
    }

    /// Withdraw `id` before it got a job. Errors mean corrupted state.
    fn cancel(&self, key: &DomainKey, id: AcquireeId) -> Result<()> {
        let mut domains = self.lock_domains();
        let Some(domain) = domains.get_mut(key) else {
            return Err(invariant_violation("cancel for domain that doesn't exist"));
        };
        let Some(acquiree) = domain.acquirees.remove(&id) else {
            return Err(invariant_violation(
                "cancel for an acquiree that doesn't exist",
            ));
        };
        if acquiree.in_progress && !domain.is_empty() {
            // canceled holding clearance; give someone else a chance
            domain.clear_next()?;
        }
        if domain.is_empty() {
            domain.lifetime.cancel();
            domains.remove(key);
        }
        Ok(())
    }

    /// `id` finished querying and will not retry. Errors mean corrupted state.
    fn done(&self, key: &DomainKey, id: AcquireeId) -> Result<()> {
        let mut domains = self.lock_domains();
        let Some(domain) = domains.get_mut(key) else {
            return Err(invariant_violation(
                "done for a domain that doesn't exist",
            ));
        };
        match domain.acquirees.get(&id) {
            None => {
                return Err(invariant_violation(
                    "done for an acquiree that doesn't exist",
                ))
            }
            Some(acquiree) if !acquiree.in_progress => {
                return Err(invariant_violation("done acquiree was not in progress"))
            }
            Some(_) => {}
        }
        domain.acquirees.remove(&id);
        if domain.is_empty() {
            domain.lifetime.cancel();
            domains.remove(key);
            return Ok(());
        }
        // keep draining while there are waiters and jobs
        domain.clear_next()
    }

    fn job_posted(&self, message: std::result::Result<&[u8], PubsubError>) {
        let message = match message {
            Ok(message) => message,
            Err(PubsubError::DroppedMessages) => {
                warn!("pubsub may have dropped job postings; clearing all domains");
                let mut domains = self.lock_domains();
                for domain in domains.values_mut() {
                    domain.clear_or_pend();
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "unhandled pubsub error");
                return;
            }
        };

        let posting = match JobPosting::decode(message) {
            Ok(posting) => posting,
            Err(e) => {
                error!(
                    error = %e,
                    message = %String::from_utf8_lossy(message),
                    "unable to parse job posting"
                );
                return;
            }
        };
        debug!(
            organization_id = ?posting.organization_id,
            provisioner_type = %posting.provisioner_type,
            tags = ?posting.tags,
            "got job posting"
        );

        let mut domains = self.lock_domains();
        // one posting is one job; waking one domain is enough
        if let Some(domain) = domains.values_mut().find(|d| d.contains(&posting)) {
            domain.clear_or_pend();
        }
    }
}

/// An acquiree's membership in its Domain. Dropping it while still
/// registered (e.g. the acquire future was dropped) withdraws the acquiree.
struct Registered<'a> {
    inner: &'a Inner,
    key: DomainKey,
    id: AcquireeId,
    active: bool,
}

impl<'a> Registered<'a> {
    fn new(inner: &'a Inner, key: DomainKey) -> Self {
        Self {
            inner,
            key,
            id: AcquireeId::new(),
            active: true,
        }
    }

    fn cancel(&mut self) -> Result<()> {
        self.active = false;
        self.inner.cancel(&self.key, self.id)
    }

    fn done(&mut self) -> Result<()> {
        self.active = false;
        self.inner.done(&self.key, self.id)
    }
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        if self.active {
            debug!(acquiree = %self.id, "acquire call dropped; withdrawing");
            // already logged by the tripwire
            let _ = self.inner.cancel(&self.key, self.id);
        }
    }
}

fn acquire_span(registration: &WorkerRegistration) -> tracing::Span {
    info_span!(
        "acquire_job",
        organization_id = %registration.organization_id(),
        worker_id = %registration.worker_id(),
        provisioner_types = ?registration.provisioner_types(),
        tags = ?registration.tags(),
    )
}

/// Subscribe to job postings, retrying with backoff, and hold the
/// subscription until `lifetime` ends
async fn subscribe(
    inner: Weak<Inner>,
    pubsub: Arc<dyn Pubsub>,
    lifetime: CancellationToken,
    mut backoff: ExponentialBackoff,
    subscribed: oneshot::Sender<()>,
) {
    let listener: ListenerWithErr = Arc::new(move |message| {
        if let Some(inner) = inner.upgrade() {
            inner.job_posted(message);
        }
    });

    let subscription = loop {
        let attempt = tokio::select! {
            biased;
            _ = lifetime.cancelled() => return,
            attempt = pubsub.subscribe_with_err(EVENT_JOB_POSTED, Arc::clone(&listener)) => attempt,
        };
        match attempt {
            Ok(subscription) => break subscription,
            Err(e) => {
                let delay = backoff.next_backoff();
                warn!(error = %e, retry_in = ?delay, "failed to subscribe to job postings");
                tokio::select! {
                    _ = lifetime.cancelled() => return,
                    _ = sleep(delay) => {}
                }
            }
        }
    };
    backoff.reset();
    info!("subscribed to job postings");
    let _ = subscribed.send(());

    lifetime.cancelled().await;
    subscription.cancel();
    debug!("unsubscribed from job postings");
}

/// Backup poll for one Domain; wakes it every `backup_poll_interval` in case
/// a posting was lost
async fn poll(inner: Arc<Inner>, key: DomainKey, lifetime: CancellationToken) {
    let period = inner.config.backup_poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = lifetime.cancelled() => return,
            _ = ticker.tick() => {
                let mut domains = inner.lock_domains();
                // the domain may have been torn down (and the key reused)
                // since the tick fired
                if lifetime.is_cancelled() {
                    return;
                }
                if let Some(domain) = domains.get_mut(&key) {
                    debug!("backup poll clearing domain");
                    domain.clear_or_pend();
                }
            }
        }
    }
}
