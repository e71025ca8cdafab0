use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let base_url = std::env::var("XRPB_CHECKOUT_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let tier_id = std::env::var("AGENT_TIER_ID").unwrap_or_else(|_| "pro".to_string());
    let fiat_amount: f64 = std::env::var("AGENT_FIAT_AMOUNT")
        .unwrap_or_else(|_| "50".to_string())
        .parse()?;

    println!("XRPB Checkout Agent");
    println!("===================");
    println!("Server: {}", base_url);
    println!("Tier: {} (${:.2})", tier_id, fiat_amount);
    println!();

    let client = Client::new();

    println!("Step 1: Fetching price board...");
    let prices: Value = client
        .get(format!("{}/prices", base_url))
        .send()
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&prices)?);
    println!();

    println!("Step 2: Initiating XRPL checkout...");
    let initiate: Value = client
        .post(format!("{}/checkout/initiate", base_url))
        .json(&json!({
            "tier_id": tier_id,
            "chain": "xrpl",
            "fiat_amount": fiat_amount
        }))
        .send()
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&initiate)?);

    let Some(payment_url) = initiate["data"]["payment_url"].as_str() else {
        anyhow::bail!("No payment URL in initiate response");
    };
    println!();
    println!("Open this link in the wallet and approve the payment:");
    println!("   {}", payment_url);
    println!();

    println!("Step 3: Waiting for the payment to land on ledger...");
    let outcome = loop {
        tokio::time::sleep(Duration::from_secs(10)).await;

        let status: Value = client
            .get(format!("{}/checkout/status", base_url))
            .send()
            .await?
            .json()
            .await?;

        match status["data"]["state"].as_str() {
            Some("polling") => {
                println!(
                    "   ...still polling (poll #{})",
                    status["data"]["polls"].as_u64().unwrap_or(0)
                );
            }
            Some("matched") => break status["data"]["payment"].clone(),
            Some("timed_out") => {
                println!("   [FAILED] Monitoring timed out.");
                println!("   Check the explorer manually before retrying.");
                return Ok(());
            }
            other => {
                println!("   [FAILED] Unexpected state: {:?}", other);
                return Ok(());
            }
        }
    };

    println!("   [OK] Payment observed:");
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!();

    println!("Step 4: Finalizing with the marketplace backend...");
    let finalize = client
        .post(format!("{}/checkout/finalize", base_url))
        .json(&json!({
            "tier_name": tier_id,
            "method": "xrpl",
            "tx_hash": outcome["tx_hash"],
            "amount": fiat_amount,
            "payment_url": payment_url
        }))
        .send()
        .await?;

    if !finalize.status().is_success() {
        let error_text = finalize.text().await?;
        anyhow::bail!("Finalize failed: {}", error_text);
    }

    let membership: Value = finalize.json().await?;
    println!("   [OK] Membership activated!");
    println!("{}", serde_json::to_string_pretty(&membership)?);

    Ok(())
}
