/// Smoke-test for `ChromiumPage`.
///
/// Launches a headless Chromium, opens <https://example.com>, waits for the
/// heading and checks that `navigator.webdriver` is hidden.
///
/// Run with:
///   cargo run --example browser_smoke --features browser
use std::time::Duration;

use argus_client::{BrowserOptions, ChromiumPage};
use argus_core::traits::PageClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("Launching headless browser…");
    let page = ChromiumPage::launch(BrowserOptions::default()).await?;

    let url = "https://example.com";
    println!("Opening {url} …");
    page.navigate(url).await?;
    page.wait_for_any(&["h1"], Duration::from_secs(10)).await?;

    let heading = page.find("h1").await?.map(|h| h.text).unwrap_or_default();
    assert_eq!(heading, "Example Domain", "Unexpected heading");

    let webdriver = page.execute("navigator.webdriver === undefined").await?;
    assert_eq!(webdriver, serde_json::Value::Bool(true), "navigator.webdriver is exposed");

    let html = page.page_source().await?;
    println!("OK: got {} bytes of rendered HTML", html.len());

    page.close().await?;
    Ok(())
}
