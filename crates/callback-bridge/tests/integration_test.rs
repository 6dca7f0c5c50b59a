use async_trait::async_trait;
use callback_bridge::mock::{CallKind, MockSdk};
use callback_bridge::{
    BridgeConfig, BridgeError, BridgeEvent, BridgeHub, EventRouter, EventSink, EventSubscriber,
    OperationContext, OperationKind, OutcomePayload, OutcomeStatus, PermissionStatus,
    ProductDetails, PurchaseFailureReason, RawEvent, RawEventKind, Readiness,
    ResourceDefinition, ResourceKey, ResourceKind, RetryPolicy, Reward, SdkAdapter, SdkError,
    SubscriberError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// --- Harness ---

struct Harness {
    router: EventRouter,
    sdk: MockSdk,
    hub: BridgeHub,
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for the bridge")
}

/// Every load succeeds straight away; everything else is driven by the test.
async fn ready_harness(config: BridgeConfig, resources: Vec<ResourceDefinition>) -> Harness {
    let router = EventRouter::new();
    let sdk = MockSdk::new();
    sdk.attach(Arc::new(router.clone()));
    sdk.on(CallKind::Load).emit([RawEventKind::LoadSucceeded]);

    let (hub, available) =
        BridgeHub::initialize(config, router.clone(), Arc::new(sdk.clone()), resources).unwrap();
    assert!(available);

    for client in hub.clients() {
        within(client.wait_until_ready()).await.unwrap();
    }
    Harness { router, sdk, hub }
}

/// Loads are recorded but never answered.
fn silent_harness(config: BridgeConfig, resources: Vec<ResourceDefinition>) -> Harness {
    let router = EventRouter::new();
    let sdk = MockSdk::new();
    sdk.attach(Arc::new(router.clone()));

    let (hub, _) =
        BridgeHub::initialize(config, router.clone(), Arc::new(sdk.clone()), resources).unwrap();
    Harness { router, sdk, hub }
}

fn key(name: &str) -> ResourceKey {
    ResourceKey::new(name)
}

fn spawn_show(
    hub: &BridgeHub,
    name: &str,
) -> tokio::task::JoinHandle<callback_bridge::Outcome> {
    let client = hub.client(&key(name)).unwrap().clone();
    tokio::spawn(async move { client.show(OperationContext::default()).await })
}

fn deliver(router: &EventRouter, name: &str, kind: RawEventKind) {
    router.deliver(RawEvent::new(name, kind));
}

async fn next_matching<P>(receiver: &mut broadcast::Receiver<BridgeEvent>, predicate: P) -> BridgeEvent
where
    P: Fn(&BridgeEvent) -> bool,
{
    loop {
        let event = within(receiver.recv()).await.unwrap();
        if predicate(&event) {
            return event;
        }
    }
}

// --- Rewarded ads ---

#[tokio::test]
async fn test_reward_then_dismiss_succeeds_with_reward() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("rewarded", ResourceKind::RewardedAd)],
    )
    .await;

    let show = spawn_show(&h.hub, "rewarded");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("rewarded"), 1)).await;

    deliver(&h.router, "rewarded", RawEventKind::DisplayStarted);
    deliver(
        &h.router,
        "rewarded",
        RawEventKind::RewardGranted {
            label: "coins".into(),
            amount: 50,
        },
    );
    deliver(&h.router, "rewarded", RawEventKind::Dismissed);

    let outcome = within(show).await.unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(
        outcome.payload(),
        Some(&OutcomePayload::Reward(Reward {
            label: "coins".into(),
            amount: 50
        }))
    );

    // Reusable: reloads by itself.
    within(h.sdk.wait_for_calls(CallKind::Load, &key("rewarded"), 2)).await;
    within(h.hub.client(&key("rewarded")).unwrap().wait_until_ready())
        .await
        .unwrap();

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dismiss_without_reward_is_cancelled() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("rewarded", ResourceKind::RewardedAd)],
    )
    .await;

    let show = spawn_show(&h.hub, "rewarded");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("rewarded"), 1)).await;
    deliver(&h.router, "rewarded", RawEventKind::Dismissed);

    let outcome = within(show).await.unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Cancelled);
    assert_eq!(outcome.error(), Some(&BridgeError::UserCancelled));
    assert_eq!(outcome.payload(), None);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reward_after_dismiss_is_published_but_outcome_stays_cancelled() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("rewarded", ResourceKind::RewardedAd)],
    )
    .await;
    let mut events = h.hub.subscribe();

    let show = spawn_show(&h.hub, "rewarded");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("rewarded"), 1)).await;
    deliver(&h.router, "rewarded", RawEventKind::Dismissed);
    deliver(
        &h.router,
        "rewarded",
        RawEventKind::RewardGranted {
            label: "gems".into(),
            amount: 1,
        },
    );

    let outcome = within(show).await.unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Cancelled);

    let earned = next_matching(&mut events, |event| {
        matches!(event, BridgeEvent::RewardEarned { .. })
    })
    .await;
    assert_eq!(
        earned,
        BridgeEvent::RewardEarned {
            key: key("rewarded"),
            reward: Reward {
                label: "gems".into(),
                amount: 1
            },
        }
    );

    h.hub.shutdown().await.unwrap();
}

// --- Interstitial ---

#[tokio::test]
async fn test_display_failure_fails_and_reloads() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;

    let show = spawn_show(&h.hub, "inter");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("inter"), 1)).await;
    deliver(
        &h.router,
        "inter",
        RawEventKind::DisplayFailed {
            code: 2,
            message: "network".into(),
        },
    );

    let outcome = within(show).await.unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(
        outcome.error(),
        Some(&BridgeError::DisplayFailed("network (code 2)".into()))
    );

    within(h.sdk.wait_for_calls(CallKind::Load, &key("inter"), 2)).await;
    within(h.hub.client(&key("inter")).unwrap().wait_until_ready())
        .await
        .unwrap();
    assert!(h.hub.is_ready(&key("inter")));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interstitial_dismiss_succeeds_without_reward() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;

    let client = h.hub.client(&key("inter")).unwrap().clone();
    let show = tokio::spawn(async move {
        client
            .show(OperationContext::with_placement("level_end"))
            .await
    });
    within(h.sdk.wait_for_calls(CallKind::Show, &key("inter"), 1)).await;
    assert_eq!(h.sdk.calls().last().unwrap().placement.as_deref(), Some("level_end"));

    deliver(&h.router, "inter", RawEventKind::Dismissed);
    let outcome = within(show).await.unwrap();
    assert!(outcome.is_success());

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sdk_rejecting_show_fails_without_waiting_for_events() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    h.sdk
        .on(CallKind::Show)
        .fail_next(SdkError::new(3, "activity destroyed"));

    let outcome = within(h.hub.show(&key("inter"), OperationContext::default())).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(
        outcome.error(),
        Some(&BridgeError::DisplayFailed("activity destroyed".into()))
    );
    assert_eq!(h.hub.ledger().pending_count(), 0);

    h.hub.shutdown().await.unwrap();
}

// --- Readiness ---

#[tokio::test]
async fn test_show_while_not_ready_creates_no_operation() {
    let h = silent_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    );
    within(h.sdk.wait_for_calls(CallKind::Load, &key("inter"), 1)).await;

    let outcome = h.hub.show(&key("inter"), OperationContext::default()).await;
    assert_eq!(outcome.status(), OutcomeStatus::NotReady);
    assert_eq!(outcome.operation_id(), None);
    assert_eq!(h.hub.ledger().pending_count(), 0);
    assert_eq!(h.sdk.count(CallKind::Show, &key("inter")), 0);

    let state = h.hub.client(&key("inter")).unwrap().snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::Loading);
    assert!(state.is_consistent());

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_begin_on_busy_resource_is_refused() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    let client = h.hub.client(&key("inter")).unwrap().clone();

    let first = client
        .begin(OperationKind::Show, OperationContext::default())
        .await
        .unwrap();
    let second = client
        .begin(OperationKind::Show, OperationContext::default())
        .await;
    assert_eq!(second.unwrap_err(), BridgeError::NotReady(key("inter")));
    assert_eq!(h.hub.readiness(&key("inter")), Some(Readiness::InFlight));

    deliver(&h.router, "inter", RawEventKind::Dismissed);
    assert!(within(first.wait()).await.is_success());

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_operation_is_rejected() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;

    let outcome = h.hub.purchase(&key("inter")).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert!(matches!(
        outcome.error(),
        Some(BridgeError::Unsupported {
            operation: OperationKind::Purchase,
            ..
        })
    ));
    assert!(h.hub.is_ready(&key("inter")));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_schedules_exactly_one_retry() {
    let config = BridgeConfig {
        retry: RetryPolicy::Fixed {
            delay_ms: 2_000,
            max_attempts: None,
        },
        ..BridgeConfig::default()
    };
    let h = silent_harness(
        config,
        vec![ResourceDefinition::new("rewarded", ResourceKind::RewardedAd)],
    );
    let client = h.hub.client(&key("rewarded")).unwrap().clone();
    let mut events = h.hub.subscribe();
    h.sdk.wait_for_calls(CallKind::Load, &key("rewarded"), 1).await;

    deliver(
        &h.router,
        "rewarded",
        RawEventKind::LoadFailed {
            code: 3,
            message: "no fill".into(),
        },
    );
    let state = client.snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::NotLoaded);
    assert_eq!(state.retry_attempt(), 1);

    let failed = next_matching(&mut events, |event| {
        matches!(event, BridgeEvent::LoadFailed { .. })
    })
    .await;
    assert_eq!(
        failed,
        BridgeEvent::LoadFailed {
            key: key("rewarded"),
            attempt: 1,
            retry_in: Some(Duration::from_secs(2)),
            reason: "Load failed: no fill (code 3)".into(),
        }
    );

    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert_eq!(h.sdk.count(CallKind::Load, &key("rewarded")), 1);

    h.sdk.wait_for_calls(CallKind::Load, &key("rewarded"), 2).await;
    assert_eq!(client.readiness(), Readiness::Loading);

    // Loading again: no further timer is armed.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.sdk.count(CallKind::Load, &key("rewarded")), 2);

    deliver(&h.router, "rewarded", RawEventKind::LoadSucceeded);
    client.wait_until_ready().await.unwrap();
    assert_eq!(client.snapshot().await.unwrap().retry_attempt(), 0);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manual_load_supersedes_pending_retry() {
    let h = silent_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    );
    let client = h.hub.client(&key("inter")).unwrap().clone();
    h.sdk.wait_for_calls(CallKind::Load, &key("inter"), 1).await;

    deliver(
        &h.router,
        "inter",
        RawEventKind::LoadFailed {
            code: 1,
            message: "timeout".into(),
        },
    );
    client.snapshot().await.unwrap();

    // Manual reload before the 2s timer fires.
    client.load().unwrap();
    h.sdk.wait_for_calls(CallKind::Load, &key("inter"), 2).await;
    deliver(&h.router, "inter", RawEventKind::LoadSucceeded);
    client.wait_until_ready().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.sdk.count(CallKind::Load, &key("inter")), 2);
    assert!(client.is_ready());

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sdk_unavailable_degrades_to_not_ready() {
    let router = EventRouter::new();
    let sdk = MockSdk::unavailable();
    let (hub, available) = BridgeHub::initialize(
        BridgeConfig::default(),
        router.clone(),
        Arc::new(sdk.clone()),
        [ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .unwrap();
    assert!(!available);

    let state = hub.client(&key("inter")).unwrap().snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::NotLoaded);
    assert_eq!(state.retry_attempt(), 0);
    assert_eq!(sdk.count(CallKind::Load, &key("inter")), 0);

    let outcome = hub.show(&key("inter"), OperationContext::default()).await;
    assert_eq!(outcome.status(), OutcomeStatus::NotReady);

    hub.shutdown().await.unwrap();
}

// --- Settlement races ---

#[tokio::test]
async fn test_duplicate_terminal_event_settles_once() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;

    let show = spawn_show(&h.hub, "inter");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("inter"), 1)).await;
    deliver(&h.router, "inter", RawEventKind::Dismissed);
    deliver(&h.router, "inter", RawEventKind::Dismissed);

    let outcome = within(show).await.unwrap();
    assert!(outcome.is_success());

    // The snapshot is answered after both events were processed.
    let state = h.hub.client(&key("inter")).unwrap().snapshot().await.unwrap();
    assert!(state.is_consistent());
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_purchase_discards_late_completion() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("coins_100", ResourceKind::Product)],
    )
    .await;
    let client = h.hub.client(&key("coins_100")).unwrap().clone();

    let handle = client
        .begin(OperationKind::Purchase, OperationContext::default())
        .await
        .unwrap();
    let id = handle.id();
    assert!(handle.cancel());

    let outcome = within(handle.wait()).await;
    assert_eq!(outcome.status(), OutcomeStatus::Cancelled);
    assert_eq!(outcome.operation_id(), Some(id));

    deliver(
        &h.router,
        "coins_100",
        RawEventKind::PurchaseCompleted {
            transaction_id: "tx-1".into(),
            receipt: "receipt".into(),
        },
    );
    let state = client.snapshot().await.unwrap();
    assert!(state.is_consistent());
    assert_eq!(state.pending_operation(), None);
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);
    assert!(!h.hub.ledger().is_pending(id));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wait_or_cancel_settles_cancelled_when_signal_fires() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("rewarded", ResourceKind::RewardedAd)],
    )
    .await;
    let client = h.hub.client(&key("rewarded")).unwrap().clone();
    let handle = client
        .begin(OperationKind::Show, OperationContext::default())
        .await
        .unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let waiting = tokio::spawn(handle.wait_or_cancel(async move {
        let _ = stop_rx.await;
    }));
    stop_tx.send(()).unwrap();

    let outcome = within(waiting).await.unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Cancelled);

    // The ad is still on screen; the unit reloads once the SDK reports the dismissal.
    let state = client.snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::NotLoaded);
    assert_eq!(h.sdk.count(CallKind::Load, &key("rewarded")), 1);

    deliver(&h.router, "rewarded", RawEventKind::Dismissed);
    within(h.sdk.wait_for_calls(CallKind::Load, &key("rewarded"), 2)).await;
    within(client.wait_until_ready()).await.unwrap();
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_answer_to_cancelled_purchase_cannot_settle_the_next_one() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("coins_100", ResourceKind::Product)],
    )
    .await;
    let client = h.hub.client(&key("coins_100")).unwrap().clone();

    let first = client
        .begin(OperationKind::Purchase, OperationContext::default())
        .await
        .unwrap();
    let first_id = first.id();
    within(h.sdk.wait_for_calls(CallKind::Purchase, &key("coins_100"), 1)).await;
    assert!(first.cancel());
    assert_eq!(within(first.wait()).await.status(), OutcomeStatus::Cancelled);

    // The store still owes the first purchase's answer, so nothing new may start.
    let state = client.snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::NotLoaded);
    assert_eq!(client.purchase().await.status(), OutcomeStatus::NotReady);
    assert_eq!(h.sdk.count(CallKind::Load, &key("coins_100")), 1);

    deliver(
        &h.router,
        "coins_100",
        RawEventKind::PurchaseCompleted {
            transaction_id: "tx-of-first".into(),
            receipt: "r1".into(),
        },
    );
    within(client.wait_until_ready()).await.unwrap();
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);
    assert!(!h.hub.ledger().is_pending(first_id));

    let purchasing = {
        let client = client.clone();
        tokio::spawn(async move { client.purchase().await })
    };
    within(h.sdk.wait_for_calls(CallKind::Purchase, &key("coins_100"), 2)).await;
    deliver(
        &h.router,
        "coins_100",
        RawEventKind::PurchaseCompleted {
            transaction_id: "tx-of-second".into(),
            receipt: "r2".into(),
        },
    );

    let second = within(purchasing).await.unwrap();
    assert!(second.is_success());
    assert_ne!(second.operation_id(), Some(first_id));
    assert_eq!(
        second.payload(),
        Some(&OutcomePayload::Transaction {
            transaction_id: "tx-of-second".into(),
            receipt: "r2".into(),
        })
    );
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_cancelled_show_releases_after_grace() {
    let config = BridgeConfig {
        orphan_grace_ms: 2_000,
        ..BridgeConfig::default()
    };
    let h = ready_harness(
        config,
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    let client = h.hub.client(&key("inter")).unwrap().clone();

    let handle = client
        .begin(OperationKind::Show, OperationContext::default())
        .await
        .unwrap();
    within(h.sdk.wait_for_calls(CallKind::Show, &key("inter"), 1)).await;
    assert!(handle.cancel());
    assert_eq!(within(handle.wait()).await.status(), OutcomeStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!client.is_ready());
    assert_eq!(h.sdk.count(CallKind::Load, &key("inter")), 1);

    within(client.wait_until_ready()).await.unwrap();
    assert_eq!(h.sdk.count(CallKind::Load, &key("inter")), 2);

    // An answer arriving after the release is still only a duplicate.
    deliver(&h.router, "inter", RawEventKind::Dismissed);
    let state = client.snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::Ready);
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_operation_timeout_fails_and_ignores_late_event() {
    let config = BridgeConfig {
        operation_timeout_ms: Some(5_000),
        ..BridgeConfig::default()
    };
    let h = ready_harness(
        config,
        vec![ResourceDefinition::new("push", ResourceKind::PushPermission)],
    )
    .await;

    let outcome = h.hub.request_permission(&key("push")).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(
        outcome.error(),
        Some(&BridgeError::Timeout(Duration::from_secs(5)))
    );

    deliver(&h.router, "push", RawEventKind::PermissionGranted);
    let state = h.hub.client(&key("push")).unwrap().snapshot().await.unwrap();
    assert_eq!(state.readiness(), Readiness::NotLoaded);
    assert_eq!(h.hub.ledger().duplicate_settlements(), 1);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_settles_pending_operation() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    let handle = h
        .hub
        .client(&key("inter"))
        .unwrap()
        .begin(OperationKind::Show, OperationContext::default())
        .await
        .unwrap();

    h.hub.shutdown().await.unwrap();

    let outcome = within(handle.wait()).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(outcome.error(), Some(&BridgeError::BridgeClosed));
    assert!(!h.router.is_registered(&key("inter")));
}

/// Loads through the mock, then dies inside `show` the way a crashing native view would.
struct PanicsOnShow(MockSdk);

#[async_trait]
impl SdkAdapter for PanicsOnShow {
    async fn load(&self, key: &ResourceKey, kind: ResourceKind) -> Result<(), SdkError> {
        self.0.load(key, kind).await
    }

    async fn show(&self, _key: &ResourceKey, _context: &OperationContext) -> Result<(), SdkError> {
        panic!("native view crashed")
    }
}

#[tokio::test]
async fn test_panicking_adapter_fails_the_operation_instead_of_hanging() {
    let router = EventRouter::new();
    let sdk = MockSdk::new();
    sdk.attach(Arc::new(router.clone()));
    sdk.on(CallKind::Load).emit([RawEventKind::LoadSucceeded]);

    let (hub, _) = BridgeHub::initialize(
        BridgeConfig::default(),
        router,
        Arc::new(PanicsOnShow(sdk)),
        [ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .unwrap();
    let client = hub.client(&key("inter")).unwrap().clone();
    within(client.wait_until_ready()).await.unwrap();
    let mut events = hub.subscribe();

    let outcome = within(client.show(OperationContext::default())).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert!(matches!(outcome.error(), Some(BridgeError::TaskFailed(_))));
    assert_eq!(hub.ledger().pending_count(), 0);
    assert!(!client.is_ready());

    let settled = next_matching(&mut events, |event| {
        matches!(event, BridgeEvent::OperationSettled(_))
    })
    .await;
    assert_eq!(settled, BridgeEvent::OperationSettled(outcome));

    assert!(matches!(
        hub.shutdown().await,
        Err(BridgeError::TaskFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_load_refused_as_unavailable_is_not_retried() {
    let config = BridgeConfig {
        retry: RetryPolicy::Fixed {
            delay_ms: 100,
            max_attempts: None,
        },
        ..BridgeConfig::default()
    };
    let router = EventRouter::new();
    let sdk = MockSdk::new();
    sdk.attach(Arc::new(router.clone()));
    sdk.on(CallKind::Load).emit([RawEventKind::LoadSucceeded]);
    sdk.on(CallKind::Load).fail_next(SdkError::unavailable());

    let (hub, _) = BridgeHub::initialize(
        config,
        router,
        Arc::new(sdk.clone()),
        [ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .unwrap();
    let mut events = hub.subscribe();

    match next_matching(&mut events, |event| matches!(event, BridgeEvent::LoadFailed { .. })).await {
        BridgeEvent::LoadFailed {
            retry_in, reason, ..
        } => {
            assert_eq!(retry_in, None);
            assert_eq!(reason, BridgeError::SdkUnavailable.to_string());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sdk.count(CallKind::Load, &key("inter")), 1);

    hub.load(&key("inter")).unwrap();
    within(hub.client(&key("inter")).unwrap().wait_until_ready())
        .await
        .unwrap();

    hub.shutdown().await.unwrap();
}

// --- Store & permission ---

#[tokio::test]
async fn test_confirm_purchase_reaches_store_in_any_readiness() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![
            ResourceDefinition::new("coins_100", ResourceKind::Product),
            ResourceDefinition::new("inter", ResourceKind::InterstitialAd),
        ],
    )
    .await;
    let client = h.hub.client(&key("coins_100")).unwrap().clone();

    // A pending transaction outlives the purchase that produced it.
    let _in_flight = client
        .begin(OperationKind::Purchase, OperationContext::default())
        .await
        .unwrap();
    within(client.confirm_purchase()).await.unwrap();
    assert_eq!(h.sdk.count(CallKind::ConfirmPurchase, &key("coins_100")), 1);

    h.sdk
        .on(CallKind::ConfirmPurchase)
        .fail_next(SdkError::new(7, "no pending transaction"));
    assert_eq!(
        within(h.hub.confirm_purchase(&key("coins_100"))).await,
        Err(BridgeError::ConfirmFailed("no pending transaction".into()))
    );

    assert!(matches!(
        h.hub.confirm_purchase(&key("inter")).await,
        Err(BridgeError::Unsupported { .. })
    ));
    assert_eq!(h.sdk.count(CallKind::ConfirmPurchase, &key("inter")), 0);

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_product_details_are_published_without_touching_readiness() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("coins_100", ResourceKind::Product)],
    )
    .await;
    let mut events = h.hub.subscribe();

    let details = ProductDetails {
        title: "100 Coins".into(),
        description: "A pile of coins".into(),
        price_string: "$0.99".into(),
        price: 0.99,
        currency_code: "USD".into(),
        available: true,
    };
    deliver(
        &h.router,
        "coins_100",
        RawEventKind::ProductDetails(details.clone()),
    );

    let event = next_matching(&mut events, |event| {
        matches!(event, BridgeEvent::ProductDetails { .. })
    })
    .await;
    assert_eq!(
        event,
        BridgeEvent::ProductDetails {
            key: key("coins_100"),
            details,
        }
    );
    assert!(h.hub.is_ready(&key("coins_100")));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_purchase_outcomes_follow_store_reason() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("no_ads", ResourceKind::Product)],
    )
    .await;

    h.sdk.on(CallKind::Purchase).emit([RawEventKind::PurchaseFailed {
        reason: "UserCancelled".into(),
        message: None,
    }]);
    let cancelled = within(h.hub.purchase(&key("no_ads"))).await;
    assert_eq!(cancelled.status(), OutcomeStatus::Cancelled);

    within(h.hub.client(&key("no_ads")).unwrap().wait_until_ready())
        .await
        .unwrap();
    h.sdk.on(CallKind::Purchase).emit([RawEventKind::PurchaseFailed {
        reason: "PaymentDeclined".into(),
        message: Some("card expired".into()),
    }]);
    let declined = within(h.hub.purchase(&key("no_ads"))).await;
    assert_eq!(declined.status(), OutcomeStatus::Failed);
    assert_eq!(
        declined.error(),
        Some(&BridgeError::PurchaseFailed {
            reason: PurchaseFailureReason::PaymentDeclined,
            message: Some("card expired".into()),
        })
    );

    within(h.hub.client(&key("no_ads")).unwrap().wait_until_ready())
        .await
        .unwrap();
    h.sdk.on(CallKind::Purchase).emit([RawEventKind::PurchaseCompleted {
        transaction_id: "GPA.1".into(),
        receipt: "{}".into(),
    }]);
    let bought = within(h.hub.purchase(&key("no_ads"))).await;
    assert_eq!(
        bought.payload(),
        Some(&OutcomePayload::Transaction {
            transaction_id: "GPA.1".into(),
            receipt: "{}".into(),
        })
    );

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restore_reports_count() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("store", ResourceKind::Storefront)],
    )
    .await;
    h.sdk
        .on(CallKind::Restore)
        .emit([RawEventKind::RestoreCompleted { restored: 2 }]);

    let outcome = within(h.hub.restore(&key("store"))).await;
    assert_eq!(outcome.payload(), Some(&OutcomePayload::Restored { count: 2 }));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_permission_is_one_shot_and_denial_fails() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("push", ResourceKind::PushPermission)],
    )
    .await;
    h.sdk
        .on(CallKind::RequestPermission)
        .emit([RawEventKind::PermissionDenied]);

    let denied = within(h.hub.request_permission(&key("push"))).await;
    assert_eq!(denied.status(), OutcomeStatus::Failed);
    assert_eq!(denied.error(), Some(&BridgeError::PermissionDenied));
    assert_eq!(
        denied.payload(),
        Some(&OutcomePayload::Permission(PermissionStatus::Denied))
    );

    // One-shot: no automatic reload.
    let client = h.hub.client(&key("push")).unwrap().clone();
    assert_eq!(client.snapshot().await.unwrap().readiness(), Readiness::NotLoaded);
    assert_eq!(h.sdk.count(CallKind::Load, &key("push")), 1);

    h.hub.load(&key("push")).unwrap();
    within(client.wait_until_ready()).await.unwrap();
    h.sdk
        .on(CallKind::RequestPermission)
        .emit([RawEventKind::PermissionProvisional]);
    let granted = within(client.request_permission()).await;
    assert!(granted.is_success());
    assert_eq!(
        granted.payload(),
        Some(&OutcomePayload::Permission(PermissionStatus::Provisional))
    );

    h.hub.shutdown().await.unwrap();
}

// --- Router & fan-out ---

#[tokio::test]
async fn test_unknown_key_is_dropped_and_unknown_show_fails() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;

    deliver(&h.router, "ghost", RawEventKind::Dismissed);
    assert_eq!(h.router.dropped_events(), 1);

    let outcome = h.hub.show(&key("ghost"), OperationContext::default()).await;
    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(
        outcome.error(),
        Some(&BridgeError::UnknownResource(key("ghost")))
    );
    assert!(h.hub.is_ready(&key("inter")));

    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_resource_is_rejected() {
    let router = EventRouter::new();
    let result = BridgeHub::initialize(
        BridgeConfig::default(),
        router,
        Arc::new(MockSdk::new()),
        [
            ResourceDefinition::new("inter", ResourceKind::InterstitialAd),
            ResourceDefinition::new("inter", ResourceKind::RewardedAd),
        ],
    );
    assert!(matches!(result, Err(BridgeError::DuplicateResource(_))));
}

#[tokio::test]
async fn test_rejected_initialization_leaves_nothing_registered() {
    let router = EventRouter::new();
    let sdk = MockSdk::new();

    let result = BridgeHub::initialize(
        BridgeConfig::default(),
        router.clone(),
        Arc::new(sdk.clone()),
        [
            ResourceDefinition::new("inter", ResourceKind::InterstitialAd),
            ResourceDefinition::new("rewarded", ResourceKind::RewardedAd),
            ResourceDefinition::new("inter", ResourceKind::RewardedAd),
        ],
    );
    assert!(matches!(result, Err(BridgeError::DuplicateResource(k)) if k == key("inter")));
    assert!(!router.is_registered(&key("inter")));
    assert!(!router.is_registered(&key("rewarded")));

    let (hub, _) = BridgeHub::initialize(
        BridgeConfig::default(),
        router.clone(),
        Arc::new(sdk.clone()),
        [ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .unwrap();
    assert!(router.is_registered(&key("inter")));

    // A key already owned by a live hub rejects the whole batch.
    let clash = BridgeHub::initialize(
        BridgeConfig::default(),
        router.clone(),
        Arc::new(sdk),
        [
            ResourceDefinition::new("rewarded", ResourceKind::RewardedAd),
            ResourceDefinition::new("inter", ResourceKind::InterstitialAd),
        ],
    );
    assert!(matches!(clash, Err(BridgeError::DuplicateResource(k)) if k == key("inter")));
    assert!(!router.is_registered(&key("rewarded")));

    hub.shutdown().await.unwrap();
}

struct RevenueCollector {
    sender: mpsc::UnboundedSender<f64>,
}

#[async_trait]
impl EventSubscriber for RevenueCollector {
    fn name(&self) -> &str {
        "revenue"
    }

    async fn on_event(&self, event: &BridgeEvent) -> Result<(), SubscriberError> {
        if let BridgeEvent::Revenue(record) = event {
            self.sender
                .send(record.amount)
                .map_err(|e| SubscriberError(e.to_string()))?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_revenue_reaches_registered_subscriber() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = h
        .hub
        .register_subscriber(Arc::new(RevenueCollector { sender: tx }));

    deliver(
        &h.router,
        "inter",
        RawEventKind::RevenuePaid {
            network: "AppLovin".into(),
            placement: Some("level_end".into()),
            amount: 0.0042,
            currency: None,
            country_code: Some("US".into()),
        },
    );

    assert_eq!(within(rx.recv()).await, Some(0.0042));
    h.hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_settled_outcome_is_broadcast() {
    let h = ready_harness(
        BridgeConfig::default(),
        vec![ResourceDefinition::new("inter", ResourceKind::InterstitialAd)],
    )
    .await;
    let mut events = h.hub.subscribe();

    let show = spawn_show(&h.hub, "inter");
    within(h.sdk.wait_for_calls(CallKind::Show, &key("inter"), 1)).await;
    deliver(&h.router, "inter", RawEventKind::Dismissed);
    let outcome = within(show).await.unwrap();

    let settled = next_matching(&mut events, |event| {
        matches!(event, BridgeEvent::OperationSettled(_))
    })
    .await;
    assert_eq!(settled, BridgeEvent::OperationSettled(outcome));

    h.hub.shutdown().await.unwrap();
}
