//! Applying the registration-date filter on the advanced-search page.

use tokio::time::sleep;

use crate::challenge::capture;
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::models::DateRange;
use crate::site;
use crate::traits::PageClient;

/// Opens the search page and filters it to companies registered in `range`.
///
/// Transient DOM failures restart the routine from navigation, up to
/// `config.filter_attempts` times. On success the first filtered listing
/// page is left open.
pub async fn apply_date_filter<P: PageClient>(
    page: &P,
    config: &HarvestConfig,
    range: &DateRange,
) -> Result<(), AppError> {
    let mut attempt = 1;
    loop {
        tracing::info!(%range, attempt, "Applying date filter");
        match try_apply(page, config, range).await {
            Ok(()) => {
                tracing::info!(%range, "Date filter applied");
                return Ok(());
            }
            Err(e) if e.is_retryable() && attempt < config.filter_attempts => {
                tracing::warn!(%range, attempt, error = %e, "Date filter not applied, retrying");
                capture(page, &format!("filter_attempt_{attempt}")).await;
                sleep(config.settle_delay).await;
                attempt += 1;
            }
            Err(e) => {
                capture(page, "filter_error").await;
                return Err(e);
            }
        }
    }
}

async fn try_apply<P: PageClient>(
    page: &P,
    config: &HarvestConfig,
    range: &DateRange,
) -> Result<(), AppError> {
    page.navigate(config.search_url.as_str()).await?;
    page.wait_for_any(&[site::FILTER_DATE_TOGGLE], config.page_load_timeout)
        .await?;
    page.execute("window.scrollTo(0, 0);").await?;
    page.click(site::FILTER_DATE_TOGGLE).await?;
    sleep(config.settle_delay).await;

    page.wait_for_any(&[site::FILTER_DATE_FROM], config.ready_timeout)
        .await?;
    let from = range.start().format("%Y-%m-%d").to_string();
    let to = range.end().format("%Y-%m-%d").to_string();
    if page.execute(&set_dates_script(&from, &to)?).await? != serde_json::Value::Bool(true) {
        return Err(AppError::ElementNotFound(format!(
            "{}, {}",
            site::FILTER_DATE_FROM,
            site::FILTER_DATE_TO
        )));
    }
    sleep(config.settle_delay).await;

    if page.execute(&apply_script()?).await? != serde_json::Value::Bool(true) {
        return Err(AppError::ElementNotFound(format!(
            "button '{}'",
            site::FILTER_APPLY_TEXT
        )));
    }
    sleep(config.settle_delay).await;
    Ok(())
}

fn set_dates_script(from: &str, to: &str) -> Result<String, AppError> {
    let from = serde_json::to_string(from)?;
    let to = serde_json::to_string(to)?;
    let (from_sel, to_sel) = (site::FILTER_DATE_FROM, site::FILTER_DATE_TO);
    Ok(format!(
        r#"(function(from, to) {{
    var pairs = [[document.querySelector('{from_sel}'), from], [document.querySelector('{to_sel}'), to]];
    if (!pairs[0][0] || !pairs[1][0]) return false;
    pairs.forEach(function(p) {{
        p[0].removeAttribute('readonly');
        p[0].value = p[1];
        p[0].dispatchEvent(new Event('input', {{ bubbles: true }}));
        p[0].dispatchEvent(new Event('change', {{ bubbles: true }}));
    }});
    return true;
}})({from}, {to});"#
    ))
}

fn apply_script() -> Result<String, AppError> {
    let label = serde_json::to_string(site::FILTER_APPLY_TEXT)?;
    Ok(format!(
        r#"(function(label) {{
    var button = Array.from(document.querySelectorAll("button[class*='primary']"))
        .find(function(b) {{ return b.textContent.indexOf(label) !== -1; }});
    if (!button) return false;
    button.scrollIntoView({{ block: 'center' }});
    button.click();
    return true;
}})({label});"#
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testutil::MockPage;

    const SEARCH: &str = r##"<html><body>
        <button data-bs-target="#flush-collapse-1">Дата регистрации</button>
        <div id="flush-collapse-1">
            <input id="reg_date_from" readonly><input id="reg_date_to" readonly>
        </div>
        <button class="btn btn-primary">Применить</button>
    </body></html>"##;

    fn may() -> DateRange {
        DateRange::month(2025, 5).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn sets_both_dates_and_applies() {
        let config = HarvestConfig::default();
        let page = MockPage::new()
            .with_page(config.search_url.as_str(), SEARCH)
            .with_script_result("removeAttribute('readonly')", json!(true))
            .with_script_result("Применить", json!(true));

        apply_date_filter(&page, &config, &may()).await.unwrap();

        assert_eq!(page.navigations(), vec![config.search_url.to_string()]);
        assert_eq!(page.clicks(), vec![site::FILTER_DATE_TOGGLE.to_string()]);
        let scripts = page.scripts();
        assert!(scripts.iter().any(|s| s.contains(r#"("2025-05-01", "2025-05-31")"#)));
        assert!(scripts.iter().any(|s| s.contains(r#"("Применить")"#)));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_up_to_the_cap() {
        let config = HarvestConfig::default()
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
        // Toggle never appears: every attempt times out.
        let page = MockPage::new();

        let err = apply_date_filter(&page, &config, &may()).await.unwrap_err();

        assert!(matches!(err, AppError::Timeout(5)));
        assert_eq!(page.navigations().len(), 3);
        assert_eq!(page.screenshots().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_apply_button_is_reported() {
        let config = HarvestConfig::default();
        let page = MockPage::new()
            .with_page(config.search_url.as_str(), SEARCH)
            .with_script_result("removeAttribute('readonly')", json!(true));

        let err = apply_date_filter(&page, &config, &may()).await.unwrap_err();

        assert!(matches!(err, AppError::ElementNotFound(_)));
        assert_eq!(page.navigations().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_is_not_retried() {
        let config = HarvestConfig::default();
        let page = MockPage::new()
            .with_page(config.search_url.as_str(), SEARCH)
            .fail_navigation(config.search_url.as_str());

        let err = apply_date_filter(&page, &config, &may()).await.unwrap_err();
        assert!(matches!(err, AppError::PageError(_)));
        assert_eq!(page.navigations().len(), 1);
    }
}
