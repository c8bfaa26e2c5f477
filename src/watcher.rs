//! Long-running rotation watcher for refresh mode.
//!
//! Consumes identity updates from a subscription stream and writes the
//! matching credential to disk on every rotation, until cancelled.

use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::artifact::CredentialArtifact;
use crate::disk::SvidDisk;
use crate::spiffe_id::SpiffeId;
use crate::update::IdentityUpdate;
use crate::workload_api::WorkloadApiError;

/// Lifecycle of a [`RotationWatcher`], observable through
/// [`RotationWatcher::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Created, not yet running.
    Starting,
    /// Waiting for the next update from the agent.
    Watching,
    /// Processing an update.
    Updating,
    /// Winding down after cancellation.
    Stopping,
    /// Finished; no further writes will happen.
    Stopped,
}

/// Watches an identity update stream and persists rotations of one target
/// identity.
///
/// The watcher never tears itself down on a bad update: selector misses,
/// parse failures and write failures are logged and the loop keeps waiting
/// for the next rotation. Only cancellation stops it. An update being
/// processed when cancellation arrives is finished before the watcher winds
/// down.
#[derive(Debug)]
pub struct RotationWatcher {
    target: SpiffeId,
    disk: SvidDisk,
    state: tokio::sync::watch::Sender<WatcherState>,
}

impl RotationWatcher {
    /// Creates a watcher persisting credentials for `target` through `disk`.
    pub fn new(target: SpiffeId, disk: SvidDisk) -> Self {
        let (state, _) = tokio::sync::watch::channel(WatcherState::Starting);
        Self {
            target,
            disk,
            state,
        }
    }

    /// Returns a receiver observing the watcher's lifecycle state.
    pub fn state(&self) -> tokio::sync::watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// Runs the watch loop until `cancel` is triggered.
    ///
    /// If the update stream ends before cancellation the watcher logs the
    /// loss once and parks; the files on disk keep serving until the
    /// credentials in them expire, so staying alive beats crash-looping the
    /// pod. The subscription is dropped exactly once, when this future
    /// returns.
    pub async fn run<S>(&self, mut updates: S, cancel: CancellationToken)
    where
        S: Stream<Item = Result<IdentityUpdate, WorkloadApiError>> + Unpin,
    {
        self.set_state(WatcherState::Watching);
        info!(target_id = %self.target, "watching for identity rotations");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("cancellation received");
                    break;
                }
                item = updates.next() => match item {
                    Some(Ok(update)) => {
                        self.set_state(WatcherState::Updating);
                        self.process_update(&update);
                        self.set_state(WatcherState::Watching);
                    }
                    Some(Err(e)) => {
                        // The subscription tearing down during shutdown is
                        // expected, not an error.
                        if cancel.is_cancelled() {
                            debug!(error = %e, "subscription wound down during shutdown");
                            break;
                        }
                        error!(error = %e, "failed to receive identity update");
                    }
                    None => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        error!("identity update stream closed by the agent");
                        cancel.cancelled().await;
                        break;
                    }
                },
            }
        }

        self.set_state(WatcherState::Stopping);
        drop(updates);
        self.set_state(WatcherState::Stopped);
        info!("rotation watcher stopped");
    }

    fn process_update(&self, update: &IdentityUpdate) {
        let svid = match update.select(&self.target) {
            Some(svid) => svid,
            None => {
                info!(target_id = %self.target, "update carries no identity for target, skipping");
                return;
            }
        };

        let bundle = update.bundles().bundle_for(self.target.trust_domain());
        let artifact = match CredentialArtifact::resolve(svid, bundle) {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(error = %e, "identity update is unusable, skipping");
                return;
            }
        };

        match self.disk.write(&artifact) {
            Ok(()) => {
                info!(dir = %self.disk.dir().display(), "rotated credentials written");
            }
            Err(e) => {
                error!(error = %e, "failed to persist rotated credentials");
            }
        }
    }

    fn set_state(&self, state: WatcherState) {
        // send only fails with no receivers, which is fine.
        let _ = self.state.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::identity_update_for;
    use std::path::Path;
    use std::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    type UpdateSender =
        tokio::sync::mpsc::Sender<Result<IdentityUpdate, WorkloadApiError>>;

    fn spawn_watcher(
        dir: &Path,
        id: &str,
        cancel: &CancellationToken,
    ) -> (tokio::task::JoinHandle<()>, UpdateSender) {
        let watcher = RotationWatcher::new(
            id.parse().unwrap(),
            SvidDisk::new(dir.to_path_buf()),
        );
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { watcher.run(ReceiverStream::new(rx), cancel).await });
        (handle, tx)
    }

    async fn wait_for_file(path: &Path) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !path.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("file never appeared");
    }

    #[tokio::test]
    async fn writes_matching_updates_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let (handle, tx) =
            spawn_watcher(dir.path(), "spiffe://example.org/workload", &cancel);

        tx.send(Ok(identity_update_for("spiffe://example.org/other")))
            .await
            .unwrap();
        tx.send(Ok(identity_update_for("spiffe://example.org/workload")))
            .await
            .unwrap();
        wait_for_file(&dir.path().join("svid.pem")).await;

        cancel.cancel();
        handle.await.unwrap();

        assert!(dir.path().join("svid.pem").exists());
        assert!(dir.path().join("svid-key.pem").exists());
        assert!(dir.path().join("bundle.pem").exists());
    }

    #[tokio::test]
    async fn three_events_with_one_match_produce_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let target = "spiffe://example.org/workload";
        let watcher = RotationWatcher::new(
            target.parse().unwrap(),
            SvidDisk::new(dir.path().to_path_buf()),
        );
        let state = watcher.state();
        let cancel = CancellationToken::new();

        let matching = identity_update_for(target);
        let expected = {
            let svid = matching.select(&target.parse().unwrap()).unwrap();
            let bundle = matching
                .bundles()
                .bundle_for(svid.spiffe_id().trust_domain());
            CredentialArtifact::resolve(svid, bundle).unwrap()
        };

        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                watcher
                    .run(ReceiverStream::new(rx), cancel)
                    .await
            })
        };

        tx.send(Ok(identity_update_for("spiffe://example.org/other")))
            .await
            .unwrap();
        tx.send(Ok(matching.clone())).await.unwrap();
        tx.send(Ok(identity_update_for("spiffe://example.org/other")))
            .await
            .unwrap();
        wait_for_file(&dir.path().join("svid.pem")).await;

        // The misses around the match leave the files untouched and the
        // watcher back in Watching.
        drop(tx);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*state.borrow(), WatcherState::Watching);
        assert_eq!(
            std::fs::read(dir.path().join("svid.pem")).unwrap(),
            expected.svid_pem()
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn miss_only_stream_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let (handle, tx) =
            spawn_watcher(dir.path(), "spiffe://example.org/workload", &cancel);

        tx.send(Ok(identity_update_for("spiffe://example.org/other")))
            .await
            .unwrap();
        // Stream end parks the watcher instead of stopping it.
        drop(tx);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        assert!(!dir.path().join("svid.pem").exists());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stream_errors_do_not_stop_the_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let (handle, tx) =
            spawn_watcher(dir.path(), "spiffe://example.org/workload", &cancel);

        tx.send(Err(WorkloadApiError::EmptyResponse)).await.unwrap();
        tx.send(Ok(identity_update_for("spiffe://example.org/workload")))
            .await
            .unwrap();
        wait_for_file(&dir.path().join("svid.pem")).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_teardown_errors_are_quiet() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tracing::instrument::WithSubscriber;
        use tracing_subscriber::layer::SubscriberExt;

        struct ErrorEvents(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorEvents {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::ERROR {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let watcher = RotationWatcher::new(
            "spiffe://example.org/workload".parse().unwrap(),
            SvidDisk::new(dir.path().to_path_buf()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorEvents(errors.clone()));

        // Connection wind-down surfaces as stream errors after the token is
        // already cancelled; none of them may be logged loudly.
        let teardown = tokio_stream::iter(vec![
            Err(WorkloadApiError::EmptyResponse),
            Err(WorkloadApiError::EmptyResponse),
        ]);
        watcher.run(teardown, cancel).with_subscriber(subscriber).await;

        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ends_in_stopped_state_after_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = RotationWatcher::new(
            "spiffe://example.org/workload".parse().unwrap(),
            SvidDisk::new(dir.path().to_path_buf()),
        );
        let state = watcher.state();
        assert_eq!(*state.borrow(), WatcherState::Starting);

        let cancel = CancellationToken::new();
        cancel.cancel();
        watcher.run(tokio_stream::empty(), cancel).await;

        assert_eq!(*state.borrow(), WatcherState::Stopped);
    }
}
