//! # SDK Integrations Demo
//!
//! Runs the whole integration stack against the [`SimulatedSdk`](sdk_integrations::simulator::SimulatedSdk):
//! 1.  Loads the configuration (`SDK_DEMO_CONFIG`, or a built-in sample).
//! 2.  Starts the [`IntegrationSystem`] and waits for the first ads to load.
//! 3.  Shows a rewarded and an interstitial placement, lists the store's products, buys
//!     one, restores purchases and asks for push permission.
//!
//! ```bash
//! RUST_LOG=info cargo run --bin sdk-demo
//! ```

use callback_bridge::tracing::setup_tracing;
use callback_bridge::EventRouter;
use sdk_integrations::revenue::RevenueLedger;
use sdk_integrations::simulator::{SimulatedSdk, SimulationProfile};
use sdk_integrations::{IntegrationConfig, IntegrationSystem};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Instrument};

const SAMPLE_CONFIG: &str = r#"
[bridge.retry]
strategy = "exponential"
initial_delay_ms = 100
factor = 2.0
max_delay_ms = 2000

[[placements]]
id = "double_coins"
ad_type = "rewarded"
ad_unit_id = "rewarded_main"

[[placements]]
id = "level_end"
ad_type = "interstitial"
ad_unit_id = "inter_main"

[[products]]
id = "gems_100"
product_type = "consumable"
"#;

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = match std::env::var("SDK_DEMO_CONFIG") {
        Ok(path) => IntegrationConfig::from_file(path),
        Err(_) => IntegrationConfig::from_toml_str(SAMPLE_CONFIG),
    }
    .map_err(|e| e.to_string())?;

    let router = EventRouter::new();
    let profile = SimulationProfile {
        failed_loads: 1,
        ..SimulationProfile::default()
    };
    let sdk = SimulatedSdk::new(Arc::new(router.clone()), profile);
    let system =
        IntegrationSystem::initialize(config, router, Arc::new(sdk)).map_err(|e| e.to_string())?;

    let revenue = RevenueLedger::new();
    let _subscription = system.register_subscriber(Arc::new(revenue.clone()));

    // The first load of every unit fails once; wait for the retry to land.
    for client in system.hub().clients() {
        if tokio::time::timeout(Duration::from_secs(5), client.wait_until_ready())
            .await
            .is_err()
        {
            error!(resource = %client.key(), "Resource did not become ready");
        }
    }

    let span = tracing::info_span!("ads");
    async {
        match system.ads.show_rewarded("double_coins").await {
            Ok(result) => info!(status = ?result.status, reward = ?result.reward, "Rewarded shown"),
            Err(e) => error!(error = %e, "Rewarded show failed"),
        }
        match system.ads.show_interstitial("level_end").await {
            Ok(result) => info!(status = ?result.status, "Interstitial shown"),
            Err(e) => error!(error = %e, "Interstitial show failed"),
        }
    }
    .instrument(span)
    .await;

    let span = tracing::info_span!("store");
    async {
        for product in system.store.products() {
            match &product.details {
                Some(details) => info!(
                    product = product.id(),
                    price = %details.price_string,
                    available = product.is_available(),
                    "Product"
                ),
                None => info!(product = product.id(), "Product metadata not reported"),
            }
        }
        match system.store.purchase("gems_100").await {
            Ok(result) => info!(
                success = result.is_success(),
                transaction_id = ?result.transaction_id,
                "Purchase finished"
            ),
            Err(e) => error!(error = %e, "Purchase failed"),
        }
        let restored = system.store.restore_purchases().await;
        info!(restored, "Restore finished");
    }
    .instrument(span)
    .await;

    if let Some(push) = &system.push {
        if push.should_show_pre_permission_prompt() {
            info!("Explaining notifications before the system prompt");
        }
        let granted = push.request_permission().await;
        info!(granted, status = ?push.status(), "Push permission");
    }

    // Revenue is delivered to subscribers asynchronously.
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        impressions = revenue.impressions().len(),
        usd = revenue.total("USD"),
        "Revenue summary"
    );

    system.shutdown().await.map_err(|e| e.to_string())?;

    info!("Demo completed successfully");
    Ok(())
}
