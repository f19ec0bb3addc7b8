use color_eyre::Result;

use crate::cache::{CacheStore, Response};
use crate::network::{Fetcher, Request};
use crate::worker::{CacheManager, CleanupReport, PopulateReport};

/// Events delivered by the hosting runtime.
#[derive(Debug, Clone)]
pub enum Event {
  /// A new deployment is being installed
  #[allow(dead_code)]
  Install,
  /// The installed deployment takes over
  #[allow(dead_code)]
  Activate,
  /// An outbound request was intercepted
  Fetch(Request),
}

/// What handling an event produced.
#[derive(Debug)]
#[allow(dead_code)]
pub enum Reaction {
  Installed(PopulateReport),
  Activated(CleanupReport),
  Responded(Response),
}

impl<S: CacheStore + 'static, F: Fetcher> CacheManager<S, F> {
  /// Dispatch an event to its handler.
  pub async fn dispatch(&self, event: &Event) -> Result<Reaction> {
    match event {
      Event::Install => self.install().await.map(Reaction::Installed),
      Event::Activate => self.activate().await.map(Reaction::Activated),
      Event::Fetch(request) => self.route(request).await.map(Reaction::Responded),
    }
  }

  /// Install then activate, as the runtime does for a fresh deployment.
  pub async fn deploy(&self) -> Result<(PopulateReport, CleanupReport)> {
    let installed = self.install().await?;
    let activated = self.activate().await?;
    Ok((installed, activated))
  }

  /// Bring the deployment up, repeating install only if the current static
  /// generation never finished one.
  pub async fn resume(&self) -> Result<(Option<PopulateReport>, CleanupReport)> {
    let installed = if self.adopt_installed()? {
      None
    } else {
      Some(self.install().await?)
    };
    let activated = self.activate().await?;
    Ok((installed, activated))
  }
}
