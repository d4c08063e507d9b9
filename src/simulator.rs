use std::sync::Arc;

use anyhow::Context;
use rand::RngCore;

use crate::{
    config::Config, device_log::DeviceLog, generator::Generator, reading::Reading,
    shutdown::Shutdown, store::RemoteStore,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub logged: usize,
    pub uploaded: usize,
    pub failed: usize,
}

pub struct Simulator<S, R> {
    config: Config,
    generator: Generator<R>,
    device_log: DeviceLog,
    store: Arc<S>,
}

impl<S, R> Simulator<S, R>
where
    S: RemoteStore + Send + Sync + 'static,
    R: RngCore,
{
    pub fn new(config: Config, device_log: DeviceLog, rng: R, store: Arc<S>) -> Self {
        let generator = Generator::new(rng, config.bounds);
        Self {
            config,
            generator,
            device_log,
            store,
        }
    }

    #[cfg(test)]
    pub fn device_log(&self) -> &DeviceLog {
        &self.device_log
    }

    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<(), anyhow::Error> {
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }

            let report = self.run_pass().await?;
            log::debug!(
                "Pass finished: {} logged, {} uploaded, {} failed",
                report.logged,
                report.uploaded,
                report.failed
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.triggered() => return Ok(()),
            }
        }
    }

    pub async fn run_pass(&mut self) -> Result<PassReport, anyhow::Error> {
        let mut report = PassReport::default();

        for device_id in &self.config.devices {
            let reading = self.generator.generate(device_id);

            match self.device_log.append(&reading) {
                Ok(count) => {
                    report.logged += 1;
                    log::debug!("Logged {device_id} ({count} entries)");
                }
                Err(e) => log::error!("Local log error for {device_id}: {e:#}"),
            }

            match upload(&self.store, &self.config.collection, reading).await? {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    report.failed += 1;
                    log::error!("Firestore error for {device_id}: {e:#}");
                }
            }
        }

        Ok(report)
    }
}

// The outer error is a crashed upload task; the inner one is the store's own failure.
async fn upload<S>(
    store: &Arc<S>,
    collection: &str,
    reading: Reading,
) -> Result<Result<(), anyhow::Error>, anyhow::Error>
where
    S: RemoteStore + Send + Sync + 'static,
{
    let store = Arc::clone(store);
    let collection = collection.to_string();

    tokio::task::spawn_blocking(move || {
        store.add(&collection, &reading).map(|id| {
            log::info!(
                "Sent: {} @ {} ({id})",
                reading.device_id,
                reading.timestamp.format("%Y-%m-%dT%H:%M:%S%.f")
            );
        })
    })
    .await
    .context("Upload task failed")
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::Duration};

    use rand::{SeedableRng, rngs::StdRng};
    use tempfile::TempDir;

    use super::*;
    use crate::{
        firestore::{Firestore, offline_account},
        shutdown,
        store::fake::FakeStore,
    };

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::new(PathBuf::from("unused.json"));
        config.logs_dir = dir.path().join("logs");
        config
    }

    fn simulator<S>(dir: &TempDir, store: Arc<S>) -> Simulator<S, StdRng>
    where
        S: RemoteStore + Send + Sync + 'static,
    {
        let config = config(dir);
        let device_log = DeviceLog::new(config.logs_dir.clone());
        device_log.init().unwrap();
        Simulator::new(config, device_log, StdRng::seed_from_u64(1), store)
    }

    #[tokio::test]
    async fn test_single_pass_creates_one_file_per_device() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut simulator = simulator(&dir, Arc::clone(&store));

        let report = simulator.run_pass().await.unwrap();

        assert_eq!(
            report,
            PassReport {
                logged: 3,
                uploaded: 3,
                failed: 0
            }
        );
        assert_eq!(fs::read_dir(dir.path().join("logs")).unwrap().count(), 3);
        for device_id in ["device_01", "device_02", "device_03"] {
            let entries = simulator.device_log().load(device_id).into_entries();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].device_id, device_id);
        }

        let attempts = store.attempts();
        assert_eq!(attempts.len(), 3);
        let devices: Vec<_> = attempts.iter().map(|(_, r)| r.device_id.as_str()).collect();
        assert_eq!(devices, ["device_01", "device_02", "device_03"]);
        assert!(attempts.iter().all(|(c, _)| c == "air_quality_data"));
    }

    #[tokio::test]
    async fn test_uploaded_reading_matches_logged_reading() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut simulator = simulator(&dir, Arc::clone(&store));

        simulator.run_pass().await.unwrap();

        for (_, uploaded) in store.attempts() {
            let logged = simulator.device_log().load(&uploaded.device_id).into_entries();
            assert_eq!(logged, vec![uploaded]);
        }
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_local_log() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::failing());
        let mut simulator = simulator(&dir, Arc::clone(&store));

        let first = simulator.run_pass().await.unwrap();
        let second = simulator.run_pass().await.unwrap();

        for report in [first, second] {
            assert_eq!(
                report,
                PassReport {
                    logged: 3,
                    uploaded: 0,
                    failed: 3
                }
            );
        }
        assert_eq!(store.attempts().len(), 6);
        assert_eq!(simulator.device_log().load("device_02").into_entries().len(), 2);
    }

    #[tokio::test]
    async fn test_local_log_failure_does_not_block_upload() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut config = config(&dir);
        // A regular file where the log directory should be.
        config.logs_dir = dir.path().join("not_a_dir");
        fs::write(&config.logs_dir, "").unwrap();
        let device_log = DeviceLog::new(config.logs_dir.clone());
        let mut simulator = Simulator::new(
            config,
            device_log,
            StdRng::seed_from_u64(1),
            Arc::clone(&store),
        );

        let report = simulator.run_pass().await.unwrap();

        assert_eq!(report.logged, 0);
        assert_eq!(report.uploaded, 3);
    }

    #[tokio::test]
    async fn test_unreachable_auth_endpoint_still_logs_locally() {
        let dir = TempDir::new().unwrap();
        let firestore = Arc::new(Firestore::new(offline_account()).unwrap());
        let mut simulator = simulator(&dir, firestore);

        let report = simulator.run_pass().await.unwrap();

        assert_eq!(
            report,
            PassReport {
                logged: 3,
                uploaded: 0,
                failed: 3
            }
        );
        for device_id in ["device_01", "device_02", "device_03"] {
            assert_eq!(simulator.device_log().load(device_id).into_entries().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_passes_accumulate_in_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut simulator = simulator(&dir, Arc::clone(&store));

        for _ in 0..4 {
            simulator.run_pass().await.unwrap();
        }

        let entries = simulator.device_log().load("device_01").into_entries();
        assert_eq!(entries.len(), 4);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_run_stops_immediately_when_already_triggered() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut simulator = simulator(&dir, Arc::clone(&store));
        let (trigger, shutdown) = shutdown::channel();
        trigger.trigger();

        simulator.run(shutdown).await.unwrap();

        assert!(store.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_during_sleep() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let mut simulator = simulator(&dir, Arc::clone(&store));
        let (trigger, shutdown) = shutdown::channel();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.trigger();
        });

        // The 30 second interval would exceed this timeout if the sleep were not cancellable.
        tokio::time::timeout(Duration::from_secs(5), simulator.run(shutdown))
            .await
            .unwrap()
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(store.attempts().len(), 3);
    }
}
