//! Install and activate: populating and garbage-collecting generations.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, RequestKey, Response};
use crate::network::{Fetcher, Request};

use super::CacheManager;

/// Controller lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Activating,
  Active,
}

/// Outcome of precaching the static generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Population {
  /// Every manifest path was fetched and stored
  Complete { entries: usize },
  /// Nothing was stored; the generation is left as it was
  Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct PopulateReport {
  pub generation: String,
  pub population: Population,
}

/// What activation did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
  /// Current generations found in the store
  pub kept: Vec<String>,
  /// Superseded generations removed
  pub deleted: Vec<String>,
  /// Superseded generations that could not be removed
  pub failed: Vec<String>,
}

impl<S: CacheStore + 'static, F: Fetcher> CacheManager<S, F> {
  pub fn state(&self) -> LifecycleState {
    match self.state.lock() {
      Ok(state) => *state,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  fn set_state(&self, next: LifecycleState) {
    let mut state = match self.state.lock() {
      Ok(state) => state,
      Err(poisoned) => poisoned.into_inner(),
    };
    debug!(from = ?*state, to = ?next, "lifecycle transition");
    *state = next;
  }

  /// Install step: open the static generation and precache the manifest,
  /// then skip waiting.
  ///
  /// Population failure is logged and swallowed; the controller still moves
  /// on so activation is never blocked by a broken manifest entry.
  pub async fn install(&self) -> Result<PopulateReport> {
    let state = self.state();
    if state != LifecycleState::Installing {
      return Err(eyre!("install already ran (state {:?})", state));
    }

    let report = self.populate().await?;

    self.set_state(LifecycleState::Waiting);
    // Skip waiting: do not hold for older controllers to be released.
    info!(generation = %self.static_name, "installed, skipping wait");

    Ok(report)
  }

  /// Take over a static generation an earlier controller already installed,
  /// moving straight to `Waiting` without precaching again.
  ///
  /// Returns whether install was skipped.
  pub fn adopt_installed(&self) -> Result<bool> {
    if self.state() != LifecycleState::Installing {
      return Ok(false);
    }
    if !self.store.is_installed(&self.static_name)? {
      return Ok(false);
    }

    self.set_state(LifecycleState::Waiting);
    info!(generation = %self.static_name, "already installed, skipping install");
    Ok(true)
  }

  /// Fetch every static path and store the whole set in one transaction.
  ///
  /// Any transport failure or non-2xx response fails the whole unit and
  /// leaves the generation untouched. Only a store that cannot even be opened
  /// is an error.
  pub async fn populate(&self) -> Result<PopulateReport> {
    self.store.open(&self.static_name)?;

    let fetches = self.manifest.static_paths.iter().map(|path| async move {
      let url = self
        .origin
        .join(path)
        .map_err(|e| eyre!("Invalid manifest path {}: {}", path, e))?;
      let response = self.fetcher.fetch(&Request::get(url)).await?;
      if !response.is_success() {
        return Err(eyre!("{} answered {}", path, response.status));
      }
      Ok::<(RequestKey, Response), color_eyre::Report>((RequestKey::get(path), response))
    });

    let population = match try_join_all(fetches).await {
      Ok(entries) => match self
        .store
        .put_all(&self.static_name, &entries)
        .and_then(|()| self.store.mark_installed(&self.static_name))
      {
        Ok(()) => Population::Complete {
          entries: entries.len(),
        },
        Err(e) => Population::Failed {
          reason: e.to_string(),
        },
      },
      Err(e) => Population::Failed {
        reason: e.to_string(),
      },
    };

    match &population {
      Population::Complete { entries } => {
        info!(generation = %self.static_name, entries, "precache complete");
      }
      Population::Failed { reason } => {
        warn!(generation = %self.static_name, %reason, "precache failed");
      }
    }

    Ok(PopulateReport {
      generation: self.static_name.clone(),
      population,
    })
  }

  /// Activate step: delete every superseded generation, then claim.
  ///
  /// Rejected before install. Repeating it once active is a no-op beyond
  /// re-running cleanup.
  pub async fn activate(&self) -> Result<CleanupReport> {
    let state = self.state();
    if !matches!(state, LifecycleState::Waiting | LifecycleState::Active) {
      return Err(eyre!("cannot activate in state {:?}", state));
    }

    self.set_state(LifecycleState::Activating);
    let report = self.cleanup();
    self.claim();
    self.set_state(LifecycleState::Active);

    Ok(report)
  }

  /// Remove every generation not named by this deployment.
  ///
  /// Failures are logged and recorded; cleanup always runs to completion.
  pub fn cleanup(&self) -> CleanupReport {
    let mut report = CleanupReport::default();

    let names = match self.store.names() {
      Ok(names) => names,
      Err(e) => {
        warn!("could not enumerate generations: {}", e);
        return report;
      }
    };

    for name in names {
      if name == self.static_name || name == self.data_name {
        report.kept.push(name);
        continue;
      }

      info!(generation = %name, "deprecated");
      match self.store.delete(&name) {
        Ok(_) => {
          info!(generation = %name, "deleted");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(generation = %name, "failed to delete: {}", e);
          report.failed.push(name);
        }
      }
    }

    report
  }

  /// Take over request handling without waiting for a reload.
  pub fn claim(&self) {
    if !self.controlling.swap(true, Ordering::SeqCst) {
      info!("claimed request handling");
    }
  }
}
