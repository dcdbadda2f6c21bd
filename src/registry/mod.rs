//! # Target Registry
//! Target mutations and the change signal that tells the watchers to rebuild
//! their job sets.
//!
//! Every successful mutation posts exactly one signal. Signals are coalesced
//! per subscriber through a single-slot channel: posts that arrive while a
//! rebuild is already pending collapse into it.

pub mod store;
pub mod watcher;

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::model::{Destination, FeedKind, Target};
use store::{TargetPatch, TargetStore};

#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<mpsc::Sender<()>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ChangeSignal {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers
            .lock()
            .expect("notifier mutex poisoned")
            .push(tx);
        ChangeSignal { rx }
    }

    /// Post a change to every live subscriber.
    pub fn notify(&self) {
        let mut subs = self.subscribers.lock().expect("notifier mutex poisoned");
        subs.retain(|tx| match tx.try_send(()) {
            Ok(()) => true,
            // A rebuild is already pending; it will see this change too.
            Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        });
    }
}

/// Receiving end of the change signal.
pub struct ChangeSignal {
    rx: mpsc::Receiver<()>,
}

impl ChangeSignal {
    /// Wait for the next change. Returns false once the notifier is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Fields supplied when a target is registered.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub id: String,
    pub kind: FeedKind,
    pub app_id: String,
    pub destination: Option<Destination>,
    pub display_name: Option<String>,
    pub locale: Option<String>,
    pub credentials: Option<String>,
}

#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn TargetStore>,
    notifier: Arc<ChangeNotifier>,
}

impl Registry {
    pub fn new(store: Arc<dyn TargetStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn register(&self, new: NewTarget) -> Result<Target> {
        let app_id = new.app_id.trim().to_string();
        if app_id.is_empty() {
            bail!("app id must not be empty");
        }
        if new.id.trim().is_empty() {
            bail!("target id must not be empty");
        }
        let target = Target {
            id: new.id,
            kind: new.kind,
            app_id,
            destination: new.destination,
            display_name: new.display_name,
            locale: new.locale,
            credentials: new.credentials,
            watermark: None,
            last_polled_at: None,
        };
        self.store.insert(target.clone()).await?;
        info!(target_id = %target.id, kind = %target.kind, "target registered");
        self.notifier.notify();
        Ok(target)
    }

    pub async fn rename(&self, id: &str, name: impl Into<String>) -> Result<Target> {
        self.patch(
            id,
            TargetPatch {
                display_name: Some(name.into()),
                ..Default::default()
            },
        )
        .await
    }

    /// Bind the target to a different destination. The watermark is
    /// forgotten so the new destination gets a seeding item.
    pub async fn relocate(&self, id: &str, destination: Destination) -> Result<Target> {
        self.patch(
            id,
            TargetPatch {
                destination: Some(destination),
                reset_watermark: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Detach the target from its destination. It stays registered but is
    /// not polled until relocated.
    pub async fn unbind(&self, id: &str) -> Result<Target> {
        self.patch(
            id,
            TargetPatch {
                clear_destination: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Move every target of `from` to `to`, e.g. when a chat group is
    /// upgraded and gets a new id. Watermarks carry over.
    pub async fn migrate_destination(&self, from: Destination, to: Destination) -> Result<usize> {
        let moved = self.store.migrate_destination(from, to).await?;
        if moved > 0 {
            info!(%from, %to, moved, "destination migrated");
            self.notifier.notify();
        }
        Ok(moved)
    }

    /// Change the feed locale. The watermark is forgotten, so the next poll
    /// reseeds against the feed as seen in the new locale.
    pub async fn reconfigure(&self, id: &str, locale: impl Into<String>) -> Result<Target> {
        self.patch(
            id,
            TargetPatch {
                locale: Some(locale.into()),
                reset_watermark: true,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_credentials(&self, id: &str, credentials: impl Into<String>) -> Result<Target> {
        self.patch(
            id,
            TargetPatch {
                credentials: Some(credentials.into()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn unregister(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!(target_id = %id, "target unregistered");
            self.notifier.notify();
        }
        Ok(removed)
    }

    /// Delete every target delivering to `destination`.
    pub async fn drop_destination(&self, destination: Destination) -> Result<usize> {
        let removed = self.store.delete_by_destination(destination).await?;
        if removed > 0 {
            info!(%destination, removed, "destination dropped");
            self.notifier.notify();
        }
        Ok(removed)
    }

    pub async fn targets_for(&self, destination: Destination) -> Result<Vec<Target>> {
        let all = self.store.list().await?;
        Ok(all
            .into_iter()
            .filter(|t| t.destination == Some(destination))
            .collect())
    }

    async fn patch(&self, id: &str, patch: TargetPatch) -> Result<Target> {
        match self.store.update(id, patch).await? {
            Some(t) => {
                self.notifier.notify();
                Ok(t)
            }
            None => bail!("target {id} not found"),
        }
    }
}
