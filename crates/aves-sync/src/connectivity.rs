//! [`Connectivity`] signals.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use aves_core::store::Connectivity;
use reqwest::Url;
use tracing::debug;

use crate::error::{Error, Result};

/// An online flag the shell flips from its own network callbacks.
///
/// Clones share the flag.
#[derive(Debug, Clone)]
pub struct ManualConnectivity {
  online: Arc<AtomicBool>,
}

impl ManualConnectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn set_online(&self, online: bool) { self.online.store(online, Ordering::Relaxed); }
}

impl Connectivity for ManualConnectivity {
  async fn is_online(&self) -> bool { self.online.load(Ordering::Relaxed) }
}

/// Online means a GET on `url` answers with a success status within
/// `timeout`.
#[derive(Clone)]
pub struct HttpProbe {
  client: reqwest::Client,
  url:    Url,
}

impl HttpProbe {
  pub fn new(url: &str, timeout: Duration) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| Error::InvalidUrl {
      url:    url.to_owned(),
      reason: e.to_string(),
    })?;
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url })
  }
}

impl Connectivity for HttpProbe {
  async fn is_online(&self) -> bool {
    match self.client.get(self.url.clone()).send().await {
      Ok(resp) => resp.status().is_success(),
      Err(e) => {
        debug!(url = %self.url, error = %e, "connectivity probe failed");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn manual_flag_is_shared_between_clones() {
    let signal = ManualConnectivity::new(false);
    let shell = signal.clone();
    assert!(!signal.is_online().await);
    shell.set_online(true);
    assert!(signal.is_online().await);
  }

  #[tokio::test]
  async fn probe_of_closed_port_is_offline() {
    let probe = HttpProbe::new("http://127.0.0.1:9/hub/health", Duration::from_millis(500)).unwrap();
    assert!(!probe.is_online().await);
  }

  #[test]
  fn probe_rejects_bad_url() {
    assert!(matches!(
      HttpProbe::new("not a url", Duration::from_secs(1)),
      Err(Error::InvalidUrl { .. })
    ));
  }
}
