//! Avabridge Loopback - host controller and guest dispatcher in one process
//!
//! Two in-process channels stand in for the web view's message bridge: the
//! host posts into the guest's inbound stream and the guest posts back into
//! a pump that feeds [`BridgeController::receive`]. Used by the
//! `avabridge-loopback` binary and by end-to-end tests.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use avabridge_guest::{GuestDispatcher, GuestHandlers, GuestOptions};
use avabridge_host::{BridgeController, BridgeOptions};
use avabridge_shared::channel;

/// A running host/guest pair.
pub struct Loopback {
    pub host: BridgeController,
    pub guest: Arc<GuestDispatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl Loopback {
    /// Wire both ends together and let the guest announce itself.
    ///
    /// Returns once `READY` has been posted; the host may still be applying
    /// it, so early sends go through its queue.
    pub async fn start(
        renderer: Arc<dyn GuestHandlers>,
        host_options: BridgeOptions,
        guest_options: GuestOptions,
    ) -> Self {
        let (host_sink, guest_inbound) = channel();
        let (guest_sink, mut host_inbound) = channel();

        let host = BridgeController::new(Arc::new(host_sink), host_options);
        let guest = Arc::new(GuestDispatcher::new(
            renderer,
            Arc::new(guest_sink),
            guest_options,
        ));

        let guest_task = {
            let guest = Arc::clone(&guest);
            tokio::spawn(async move { guest.run(guest_inbound).await })
        };
        let host_task = {
            let host = host.clone();
            tokio::spawn(async move {
                while let Some(raw) = host_inbound.next().await {
                    host.receive(&raw).await;
                }
                tracing::debug!("Guest channel closed, host pump stopping");
            })
        };

        host.begin_connecting();
        guest.announce_ready().await;
        tracing::info!("Loopback bridge started");

        Self {
            host,
            guest,
            tasks: vec![guest_task, host_task],
        }
    }

    /// Dispose the host and stop both pumps.
    pub async fn shutdown(self) {
        self.host.dispose().await;
        for task in self.tasks {
            task.abort();
        }
        tracing::info!("Loopback bridge stopped");
    }
}
