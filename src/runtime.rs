//! Per run state: deploy time, run naming and shutdown flag.
use hifitime::prelude::{Duration, Epoch};
use tokio::sync::watch;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Runtime {
    /// Epoch of deployment
    deploy_time: Epoch,

    /// Shutdown flag
    shutdown: watch::Sender<bool>,
}

impl Runtime {
    /// Deploys a new [Runtime] at current system time
    pub fn new() -> Result<Self> {
        let now = Epoch::now()
            .map_err(|e| Error::Config(format!("failed to determine system time: {}", e)))?;
        Ok(Self::deployed_at(now))
    }

    pub fn deployed_at(deploy_time: Epoch) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            deploy_time,
            shutdown,
        }
    }

    /// Time since deployment
    pub fn uptime(&self) -> Duration {
        match Epoch::now() {
            Ok(now) => now - self.deploy_time,
            Err(_) => Duration::ZERO,
        }
    }

    /// Run identifier "YYYY_MM_DD_HH_MM_SS", used to name run products
    pub fn run_name(&self) -> String {
        let (y, m, d, hh, mm, ss, _) = self.deploy_time.to_gregorian_utc();
        format!(
            "{:04}_{:02}_{:02}_{:02}_{:02}_{:02}",
            y, m, d, hh, mm, ss
        )
    }

    /// Subscribes to the shutdown flag
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Raises the shutdown flag
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::t;

    #[test]
    fn test_run_name() {
        let runtime = Runtime::deployed_at(t(9, 5, 7, 250));
        assert_eq!(runtime.run_name(), "2020_07_22_09_05_07");
        assert!(runtime.uptime() > Duration::ZERO);
    }

    #[test]
    fn test_shutdown() {
        let runtime = Runtime::deployed_at(t(9, 0, 0, 0));
        let rx = runtime.shutdown_receiver();
        assert!(!runtime.is_shutdown());
        assert!(!*rx.borrow());

        runtime.shutdown();
        assert!(runtime.is_shutdown());
        assert!(*rx.borrow());
    }
}
