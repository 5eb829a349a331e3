//! The rule store: one device's rules, kept in step with the device.
//!
//! Every mutation is applied locally first, written to the device, and
//! undone if the write fails. Operations hold the store lock for their whole
//! duration, so they run one at a time in arrival order and each rollback
//! restores exactly the state the operation started from.
//!
//! Two failures cannot be undone locally because the device may already
//! have changed: a write that timed out, and any failed reorder. Both force
//! a reload from the device instead.

use std::sync::Arc;

use clashdash_luci::CommandRunner;
use clashdash_rules::{Rule, RuleId};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendVariant, Baseline, Fetched, RuleBackend};
use crate::error::StoreError;
use crate::ruleset::{RuleSet, Undo};
use crate::state::StoreState;

/// What observers see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub state: StoreState,
    /// Empty until the first successful load.
    pub rules: RuleSet,
}

#[derive(Debug, Default)]
struct Inner {
    state: StoreState,
    set: RuleSet,
    baseline: Option<Baseline>,
    /// Reason from the last failed plugin check.
    unsupported: Option<String>,
}

/// Remote effect of a mutation.
#[derive(Debug, Clone, Copy)]
enum Write {
    Rules,
    Reorder,
    Master(bool),
}

/// Coordinates rule edits for one device.
pub struct RuleStore {
    backend: Arc<dyn RuleBackend>,
    runner: Arc<dyn CommandRunner>,
    inner: Mutex<Inner>,
    tx: watch::Sender<Snapshot>,
    owner: CancellationToken,
}

impl RuleStore {
    /// Results arriving after `owner` is cancelled are discarded.
    pub fn new(
        backend: Arc<dyn RuleBackend>,
        runner: Arc<dyn CommandRunner>,
        owner: CancellationToken,
    ) -> Self {
        let (tx, _) = watch::channel(Snapshot::default());
        Self {
            backend,
            runner,
            inner: Mutex::new(Inner::default()),
            tx,
            owner,
        }
    }

    pub fn variant(&self) -> BackendVariant {
        self.backend.variant()
    }

    /// Watch state and rules.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> StoreState {
        self.tx.borrow().state
    }

    /// Detach from the owner; in-flight results are dropped.
    pub fn close(&self) {
        self.owner.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.owner.is_cancelled()
    }

    /// Replace local rules with a fresh read from the device.
    ///
    /// On failure the store returns to the state it was in before.
    pub async fn load(&self) -> Result<(), StoreError> {
        let mut inner = self.acquire().await?;
        let previous = inner.state;
        self.set_state(&mut inner, StoreState::Loading);

        match self.reload(&mut inner).await {
            Ok(()) => Ok(()),
            Err(StoreError::Detached) => Err(StoreError::Detached),
            Err(e) => {
                warn!(variant = %self.variant(), error = %e, "load failed");
                self.set_state(&mut inner, previous);
                Err(e)
            }
        }
    }

    /// Add a rule at the front or the end. Returns its id.
    pub async fn insert(&self, rule: Rule, at_front: bool) -> Result<RuleId, StoreError> {
        rule.validate()?;
        let id = rule.id;
        self.mutate("insert", Write::Rules, move |set| {
            Ok(set.insert(rule, at_front))
        })
        .await?;
        Ok(id)
    }

    /// Replace the rule with the same id, keeping its position.
    pub async fn update(&self, rule: Rule) -> Result<(), StoreError> {
        rule.validate()?;
        self.mutate("update", Write::Rules, move |set| set.replace(rule))
            .await
    }

    pub async fn delete(&self, id: RuleId) -> Result<(), StoreError> {
        self.mutate("delete", Write::Rules, move |set| set.remove(id))
            .await
    }

    /// Flip one rule's enabled flag.
    pub async fn toggle(&self, id: RuleId) -> Result<(), StoreError> {
        self.mutate("toggle", Write::Rules, move |set| set.toggle(id))
            .await
    }

    /// Rewrite the rules in `order`, which must list every rule once.
    pub async fn reorder(&self, order: &[RuleId]) -> Result<(), StoreError> {
        self.mutate("reorder", Write::Reorder, |set| set.reorder(order))
            .await
    }

    /// Switch the whole rule set on or off without touching any rule.
    pub async fn set_master_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.mutate("master", Write::Master(enabled), move |set| {
            Ok(set.set_master(enabled))
        })
        .await
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Detached);
        }
        let inner = self.inner.lock().await;
        if self.is_closed() {
            return Err(StoreError::Detached);
        }
        Ok(inner)
    }

    async fn mutate<F>(&self, op: &'static str, write: Write, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RuleSet) -> Result<Undo, StoreError>,
    {
        let mut inner = self.acquire().await?;
        if let Some(reason) = &inner.unsupported {
            return Err(StoreError::Unsupported(reason.clone()));
        }
        if inner.state != StoreState::Ready {
            return Err(StoreError::NotReady(inner.state.to_string()));
        }

        let undo = edit(&mut inner.set)?;
        self.set_state(&mut inner, StoreState::Mutating);
        debug!(op, rules = inner.set.len(), "applied locally, writing");

        let result = match write {
            Write::Master(enabled) => self
                .backend
                .set_master(&*self.runner, enabled)
                .await
                .map(|()| None),
            Write::Rules | Write::Reorder => match &inner.baseline {
                Some(baseline) => self
                    .backend
                    .write(&*self.runner, baseline, &inner.set.rules)
                    .await
                    .map(Some),
                None => Err(StoreError::NotReady("no baseline".into())),
            },
        };

        if self.is_closed() {
            debug!(op, "owner gone, discarding result");
            return Err(StoreError::Detached);
        }

        match result {
            Ok(baseline) => {
                if let Some(baseline) = baseline {
                    inner.baseline = Some(baseline);
                }
                info!(op, rules = inner.set.len(), "write committed");
                self.set_state(&mut inner, StoreState::Ready);
                Ok(())
            }
            Err(e) if matches!(write, Write::Reorder) => {
                warn!(op, error = %e, "reorder interrupted, reloading");
                Err(self.force_reload(&mut inner, StoreError::ReorderInterrupted, e).await)
            }
            Err(e) if e.is_timeout() => {
                warn!(op, error = %e, "write outcome unknown, reloading");
                Err(self.force_reload(&mut inner, StoreError::OutcomeUnknown, e).await)
            }
            Err(e) => {
                warn!(op, error = %e, "write failed, rolling back");
                inner.set.undo(undo);
                self.set_state(&mut inner, StoreState::Ready);
                Err(e)
            }
        }
    }

    /// Reload after a write whose remote effect is unknown.
    ///
    /// If the reload fails too the store is left `Unloaded` with the stale
    /// rules still visible.
    async fn force_reload(
        &self,
        inner: &mut Inner,
        wrap: fn(String) -> StoreError,
        cause: StoreError,
    ) -> StoreError {
        self.set_state(inner, StoreState::Loading);
        match self.reload(inner).await {
            Ok(()) => wrap(cause.to_string()),
            Err(StoreError::Detached) => StoreError::Detached,
            Err(e) => {
                warn!(error = %e, "forced reload failed");
                self.set_state(inner, StoreState::Unloaded);
                wrap(format!("{cause}; reload failed: {e}"))
            }
        }
    }

    /// Gate, fetch and install. Leaves `inner` untouched on error.
    async fn reload(&self, inner: &mut Inner) -> Result<(), StoreError> {
        let result = self.fetch().await;
        if self.is_closed() {
            return Err(StoreError::Detached);
        }

        match result {
            Ok(fetched) => {
                info!(
                    variant = %self.variant(),
                    rules = fetched.rules.len(),
                    faults = fetched.faults.len(),
                    master = fetched.master_enabled,
                    "rules loaded"
                );
                inner.unsupported = None;
                inner.baseline = Some(fetched.baseline);
                inner.set = RuleSet::new(fetched.rules, fetched.master_enabled, fetched.faults);
                self.set_state(inner, StoreState::Ready);
                Ok(())
            }
            Err(StoreError::Unsupported(reason)) => {
                inner.unsupported = Some(reason.clone());
                Err(StoreError::Unsupported(reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self) -> Result<Fetched, StoreError> {
        self.backend.check_support(&*self.runner).await?;
        self.backend.fetch(&*self.runner).await
    }

    fn set_state(&self, inner: &mut Inner, state: StoreState) {
        inner.state = state;
        self.tx.send_replace(Snapshot {
            state,
            rules: inner.set.clone(),
        });
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("variant", &self.variant())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
