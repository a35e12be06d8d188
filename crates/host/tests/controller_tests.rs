//! Controller behavior against a scripted guest.
//!
//! The test plays the guest: it reads what the controller posts and feeds
//! raw replies back through `receive`. Timers run on paused tokio time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{FutureExt, StreamExt};
use tokio::time::Instant;

use avabridge_host::{
    BridgeController, BridgeError, BridgeOptions, CameraView, ConnectionStatus, RetryBackoff,
};
use avabridge_shared::{
    channel, parse_host_message, serialize, AvatarConfig, BridgeErrorCode, CameraPreset,
    GuestMessage, HostMessage, HostMessageKind, Snapshot, SnapshotFormat, SnapshotOptions,
};

fn bridge(options: BridgeOptions) -> (BridgeController, UnboundedReceiver<String>) {
    let (sink, rx) = channel();
    (BridgeController::new(Arc::new(sink), options), rx)
}

fn fast_options() -> BridgeOptions {
    BridgeOptions {
        timeout: Duration::from_millis(100),
        max_retries: 2,
        retry_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn ready_bridge(options: BridgeOptions) -> (BridgeController, UnboundedReceiver<String>) {
    let settle = options.settle_delay;
    let (bridge, rx) = bridge(options);
    guest_says(&bridge, GuestMessage::Ready { version: "1.0.0".into() }).await;
    tokio::time::sleep(settle + Duration::from_millis(1)).await;
    (bridge, rx)
}

async fn guest_says(bridge: &BridgeController, event: GuestMessage) {
    bridge.receive(&serialize(&event)).await;
}

async fn ack(bridge: &BridgeController, message_id: &str) {
    guest_says(
        bridge,
        GuestMessage::Ack {
            message_id: message_id.into(),
            success: true,
        },
    )
    .await;
}

async fn next_host(rx: &mut UnboundedReceiver<String>) -> HostMessage {
    let raw = tokio::time::timeout(Duration::from_secs(60), rx.next())
        .await
        .expect("host message in time")
        .expect("channel open");
    parse_host_message(&raw).expect("host message")
}

fn id_of(message: &HostMessage) -> String {
    message.message_id().expect("message id").to_owned()
}

async fn wait_for_queued(bridge: &BridgeController, count: usize) {
    while bridge.queued_count().await < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn sends_before_ready_are_queued_then_flushed_after_settle_delay() {
    let (bridge, mut rx) = bridge(BridgeOptions::default());

    let sender = bridge.clone();
    let init = tokio::spawn(async move {
        sender
            .init_avatar(AvatarConfig {
                avatar_id: Some("fox".into()),
                ..Default::default()
            })
            .await
    });
    wait_for_queued(&bridge, 1).await;
    assert!(rx.next().now_or_never().is_none());
    assert_eq!(bridge.status(), ConnectionStatus::Disconnected);

    guest_says(&bridge, GuestMessage::InitStarted).await;
    assert_eq!(bridge.status(), ConnectionStatus::Connecting);
    guest_says(&bridge, GuestMessage::Ready { version: "1.0.0".into() }).await;
    assert_eq!(bridge.status(), ConnectionStatus::Ready);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.next().now_or_never().is_none(), "flushed before settle delay");

    let sent = next_host(&mut rx).await;
    assert_eq!(sent.kind(), HostMessageKind::InitAvatar);
    assert_eq!(bridge.queued_count().await, 0);
    assert_eq!(bridge.pending_count().await, 1);

    ack(&bridge, &id_of(&sent)).await;
    assert_eq!(init.await.expect("join"), Ok(()));
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn queue_flushes_in_submission_order() {
    let (bridge, mut rx) = bridge(BridgeOptions::default());

    let mut handles = Vec::new();
    for (i, pose) in ["wave", "bow", "idle"].into_iter().enumerate() {
        let sender = bridge.clone();
        handles.push(tokio::spawn(async move { sender.set_pose(pose).await }));
        wait_for_queued(&bridge, i + 1).await;
    }

    guest_says(&bridge, GuestMessage::Ready { version: "1.0.0".into() }).await;

    let mut poses = Vec::new();
    for _ in 0..3 {
        let sent = next_host(&mut rx).await;
        ack(&bridge, &id_of(&sent)).await;
        if let HostMessage::SetPose { pose, .. } = sent {
            poses.push(pose);
        }
    }
    assert_eq!(poses, vec!["wave", "bow", "idle"]);
    for handle in handles {
        assert_eq!(handle.await.expect("join"), Ok(()));
    }
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_is_retransmitted_then_times_out() {
    let (bridge, mut rx) = ready_bridge(fast_options()).await;
    let started = Instant::now();

    let sender = bridge.clone();
    let pose = tokio::spawn(async move { sender.set_pose("wave").await });

    let first = next_host(&mut rx).await;
    let second = next_host(&mut rx).await;
    let third = next_host(&mut rx).await;
    assert_eq!(first, second);
    assert_eq!(second, third);

    let result = pose.await.expect("join");
    let elapsed = started.elapsed();
    assert_eq!(
        result,
        Err(BridgeError::Timeout {
            message_id: id_of(&first),
            attempts: 3
        })
    );
    // 3 windows of 100ms plus 2 retry pauses of 50ms
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(450), "{elapsed:?}");
    assert!(rx.next().now_or_never().is_none());
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn ack_after_a_retransmission_still_resolves() {
    let (bridge, mut rx) = ready_bridge(fast_options()).await;

    let sender = bridge.clone();
    let pose = tokio::spawn(async move { sender.set_pose("wave").await });

    let first = next_host(&mut rx).await;
    let _retry = next_host(&mut rx).await;
    ack(&bridge, &id_of(&first)).await;

    assert_eq!(pose.await.expect("join"), Ok(()));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.next().now_or_never().is_none(), "no retransmission after ack");
}

#[tokio::test(start_paused = true)]
async fn negative_ack_rejects() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let interactive = tokio::spawn(async move { sender.set_interactive(true).await });
    let sent = next_host(&mut rx).await;
    guest_says(
        &bridge,
        GuestMessage::Ack {
            message_id: id_of(&sent),
            success: false,
        },
    )
    .await;

    assert_eq!(
        interactive.await.expect("join"),
        Err(BridgeError::Rejected {
            message_id: id_of(&sent)
        })
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_resolves_on_snapshot_ready_not_on_ack() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let snapshot = tokio::spawn(async move { sender.take_snapshot(SnapshotOptions::png()).await });

    let sent = next_host(&mut rx).await;
    assert_eq!(sent.kind(), HostMessageKind::TakeSnapshot);
    let id = id_of(&sent);

    ack(&bridge, &id).await;
    tokio::task::yield_now().await;
    assert!(!snapshot.is_finished());

    let frame = Snapshot::from_bytes(&[1, 2, 3], 320, 240, SnapshotFormat::Png);
    guest_says(&bridge, GuestMessage::snapshot_ready(frame.clone(), Some(id))).await;

    assert_eq!(snapshot.await.expect("join"), Ok(frame));
}

#[tokio::test(start_paused = true)]
async fn snapshot_reply_without_id_settles_oldest_request() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let first = bridge.clone();
    let older = tokio::spawn(async move { first.take_snapshot(SnapshotOptions::png()).await });
    let _ = next_host(&mut rx).await;
    let second = bridge.clone();
    let newer = tokio::spawn(async move { second.take_snapshot(SnapshotOptions::png()).await });
    let _ = next_host(&mut rx).await;

    let frame = Snapshot::from_bytes(&[9], 1, 1, SnapshotFormat::Png);
    guest_says(&bridge, GuestMessage::snapshot_ready(frame.clone(), None)).await;

    assert_eq!(older.await.expect("join"), Ok(frame));
    assert!(!newer.is_finished());
    assert_eq!(bridge.pending_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_error_rejects_with_guest_code() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let snapshot = tokio::spawn(async move { sender.take_snapshot(SnapshotOptions::png()).await });
    let id = id_of(&next_host(&mut rx).await);

    guest_says(
        &bridge,
        GuestMessage::Error {
            message: "context lost".into(),
            code: BridgeErrorCode::SnapshotError,
            stack: None,
            message_id: Some(id),
        },
    )
    .await;

    let error = snapshot.await.expect("join").expect_err("rejected");
    assert_eq!(error.code(), BridgeErrorCode::SnapshotError);
    assert_eq!(bridge.status(), ConnectionStatus::Ready, "request-scoped errors keep the channel up");
}

#[tokio::test(start_paused = true)]
async fn load_error_rejects_avatar_swap() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let swap = tokio::spawn(async move { sender.set_avatar("ghost", None).await });
    let id = id_of(&next_host(&mut rx).await);

    guest_says(
        &bridge,
        GuestMessage::LoadError {
            message: "404".into(),
            url: None,
            message_id: Some(id),
        },
    )
    .await;

    let error = swap.await.expect("join").expect_err("rejected");
    assert_eq!(error.code(), BridgeErrorCode::AvatarLoadError);
}

#[tokio::test(start_paused = true)]
async fn ping_measures_round_trip() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let ping = tokio::spawn(async move { sender.ping().await });
    let id = id_of(&next_host(&mut rx).await);

    tokio::time::sleep(Duration::from_millis(30)).await;
    guest_says(
        &bridge,
        GuestMessage::Pong {
            message_id: Some(id),
            timestamp: Some(0),
        },
    )
    .await;

    let latency = ping.await.expect("join").expect("pong");
    assert!(latency >= Duration::from_millis(30), "{latency:?}");
    assert!(latency < Duration::from_millis(40), "{latency:?}");
}

#[tokio::test(start_paused = true)]
async fn concurrent_sends_get_distinct_ids() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    // handles[i] posted ids[i]
    let mut handles = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..5 {
        let sender = bridge.clone();
        handles.push(tokio::spawn(async move {
            sender.set_camera(CameraView::Preset(CameraPreset::Front), None).await
        }));
        ids.push(id_of(&next_host(&mut rx).await));
    }
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    // One ack settles exactly one request
    ack(&bridge, &ids[2]).await;
    let settled = handles.remove(2);
    assert_eq!(settled.await.expect("join"), Ok(()));
    tokio::task::yield_now().await;
    assert!(handles.iter().all(|handle| !handle.is_finished()));
    assert_eq!(bridge.pending_count().await, 4);

    // Settle the rest out of order
    ids.remove(2);
    for id in ids.iter().rev() {
        ack(&bridge, id).await;
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join"), Ok(()));
    }
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn linear_backoff_grows_retry_pauses() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions {
        backoff: RetryBackoff::Linear,
        ..fast_options()
    })
    .await;
    let started = Instant::now();

    let sender = bridge.clone();
    let pose = tokio::spawn(async move { sender.set_pose("wave").await });

    let first = next_host(&mut rx).await;
    let _ = next_host(&mut rx).await;
    let second_at = started.elapsed();
    assert!(second_at >= Duration::from_millis(150), "{second_at:?}");
    assert!(second_at < Duration::from_millis(160), "{second_at:?}");
    let _ = next_host(&mut rx).await;
    let third_at = started.elapsed();
    assert!(third_at >= Duration::from_millis(350), "{third_at:?}");
    assert!(third_at < Duration::from_millis(360), "{third_at:?}");

    let result = pose.await.expect("join");
    let elapsed = started.elapsed();
    assert_eq!(
        result,
        Err(BridgeError::Timeout {
            message_id: id_of(&first),
            attempts: 3
        })
    );
    // 3 windows of 100ms plus retry pauses of 50ms then 100ms
    assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_everything_and_is_idempotent() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let in_flight = tokio::spawn(async move { sender.set_pose("wave").await });
    let _ = next_host(&mut rx).await;
    assert_eq!(bridge.pending_count().await, 1);

    bridge.reset().await;
    assert_eq!(in_flight.await.expect("join"), Err(BridgeError::Cancelled));
    assert_eq!(bridge.status(), ConnectionStatus::Disconnected);

    // Not ready any more, so this one queues and is cancelled by the next reset
    let sender = bridge.clone();
    let queued = tokio::spawn(async move { sender.set_pose("bow").await });
    wait_for_queued(&bridge, 1).await;

    bridge.reset().await;
    bridge.reset().await;
    assert_eq!(queued.await.expect("join"), Err(BridgeError::Cancelled));
    assert_eq!(bridge.pending_count().await, 0);
    assert_eq!(bridge.queued_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn reset_during_settle_delay_drops_the_flush() {
    let (bridge, mut rx) = bridge(BridgeOptions::default());

    let sender = bridge.clone();
    let queued = tokio::spawn(async move { sender.set_pose("wave").await });
    wait_for_queued(&bridge, 1).await;

    guest_says(&bridge, GuestMessage::Ready { version: "1.0.0".into() }).await;
    bridge.reset().await;
    assert_eq!(queued.await.expect("join"), Err(BridgeError::Cancelled));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.next().now_or_never().is_none());
}

#[tokio::test(start_paused = true)]
async fn use_acknowledgment_false_resolves_on_post() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions {
        use_acknowledgment: false,
        ..fast_options()
    })
    .await;

    assert_eq!(bridge.set_pose("wave").await, Ok(()));
    assert_eq!(bridge.pending_count().await, 0);
    assert_eq!(next_host(&mut rx).await.kind(), HostMessageKind::SetPose);

    // Snapshot still waits for its reply
    let sender = bridge.clone();
    let snapshot = tokio::spawn(async move { sender.take_snapshot(SnapshotOptions::png()).await });
    let _ = next_host(&mut rx).await;
    tokio::task::yield_now().await;
    assert!(!snapshot.is_finished());
    assert_eq!(bridge.pending_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn uncorrelated_error_faults_the_channel() {
    let (bridge, _rx) = ready_bridge(BridgeOptions::default()).await;
    let mut state = bridge.subscribe_state();

    guest_says(
        &bridge,
        GuestMessage::Error {
            message: "renderer crashed".into(),
            code: BridgeErrorCode::UnknownError,
            stack: None,
            message_id: None,
        },
    )
    .await;

    assert!(state.has_changed().expect("sender alive"));
    let current = state.borrow_and_update().clone();
    assert_eq!(current.status, ConnectionStatus::Error);
    assert_eq!(
        current.last_error.map(|e| e.message),
        Some("renderer crashed".to_string())
    );

    // A fresh READY recovers the channel
    guest_says(&bridge, GuestMessage::Ready { version: "1.0.0".into() }).await;
    assert_eq!(bridge.status(), ConnectionStatus::Ready);
    assert!(bridge.state().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn transport_errors_surface_as_webview_errors() {
    let (bridge, _rx) = bridge(BridgeOptions::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge
        .subscribe_events(move |event| sink.lock().expect("lock").push(event))
        .await;

    bridge.begin_connecting();
    assert_eq!(bridge.status(), ConnectionStatus::Connecting);
    bridge.report_transport_error("navigation failed").await;

    let state = bridge.state();
    assert_eq!(state.status, ConnectionStatus::Error);
    assert_eq!(
        state.last_error.map(|e| e.code),
        Some(BridgeErrorCode::WebviewError)
    );
    let seen = seen.lock().expect("lock");
    assert!(matches!(
        seen.as_slice(),
        [GuestMessage::Error { code: BridgeErrorCode::WebviewError, .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_telemetry_and_state_tracks_it() {
    let (bridge, _rx) = bridge(BridgeOptions::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge
        .subscribe_events(move |event: GuestMessage| sink.lock().expect("lock").push(event.kind()))
        .await;

    guest_says(&bridge, GuestMessage::FpsUpdate { fps: 59.0 }).await;
    guest_says(
        &bridge,
        GuestMessage::LoadingProgress {
            percent: 40.0,
            stage: "textures".into(),
        },
    )
    .await;
    bridge.receive(r#"{"type":"SOMETHING_NEW","x":1}"#).await;
    bridge.receive("not json").await;

    let state = bridge.state();
    assert_eq!(state.fps, Some(59.0));
    assert_eq!(state.loading_progress, Some(40.0));
    assert_eq!(state.loading_stage.as_deref(), Some("textures"));
    assert_eq!(seen.lock().expect("lock").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn late_and_unknown_acks_are_ignored() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let pose = tokio::spawn(async move { sender.set_pose("wave").await });
    let id = id_of(&next_host(&mut rx).await);
    ack(&bridge, &id).await;
    assert_eq!(pose.await.expect("join"), Ok(()));

    ack(&bridge, &id).await;
    ack(&bridge, "never-sent").await;
    assert_eq!(bridge.pending_count().await, 0);
    assert_eq!(bridge.status(), ConnectionStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn caller_supplied_id_is_kept() {
    let (bridge, mut rx) = ready_bridge(BridgeOptions::default()).await;

    let sender = bridge.clone();
    let update = tokio::spawn(async move {
        sender
            .send_message(HostMessage::UpdateConfig {
                config: AvatarConfig {
                    outfit: Some("coat".into()),
                    ..Default::default()
                },
                message_id: Some("mine".into()),
            })
            .await
    });
    assert_eq!(id_of(&next_host(&mut rx).await), "mine");
    ack(&bridge, "mine").await;
    assert_eq!(update.await.expect("join"), Ok(()));
}
