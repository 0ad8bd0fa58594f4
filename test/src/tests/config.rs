use anyhow::{Result, ensure};
use libtest_mimic::Trial;
use reqwest::StatusCode;
use serde_json::json;

use crate::capabilities::Capabilities;
use crate::client::error_body;
use crate::context::{ctx, run};
use crate::types::DisplayConfig;

/// Runs `f`, then puts the fields it may have touched back.
async fn with_config_restore<F, Fut>(f: F) -> Result<()>
where
    F: FnOnce(DisplayConfig) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let client = &ctx().client;
    let original = client.get_config().await?;

    let result = f(original.clone()).await;

    for (field, value) in [
        ("brightness", json!(original.brightness)),
        ("slowdown", json!(original.slowdown)),
        ("slide-seconds", json!(original.slide_seconds)),
        ("center", json!(original.center)),
    ] {
        if let Err(e) = client.set_config_field(field, value).await {
            eprintln!("  WARNING: restoring {field} failed: {e:#}");
        }
    }

    result
}

pub fn register(caps: &Capabilities) -> Vec<Trial> {
    let http = caps.http;
    let writable = caps.writable;
    vec![
        Trial::test("config::get_is_within_ranges", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let config = ctx().client.get_config().await?;
                ensure!(config.brightness <= 100, "brightness {}", config.brightness);
                ensure!(
                    (-1..=4).contains(&config.slowdown),
                    "slowdown {}",
                    config.slowdown
                );
                ensure!(config.led_rows > 0 && config.led_cols > 0, "zero panel size");
                ensure!(!config.gpio_mapping.is_empty(), "gpio_mapping empty");
                ensure!(config.source_dir.starts_with('/'), "source_dir not absolute");
                Ok(())
            })
        }),
        Trial::test("config::set_brightness_round_trips", move || {
            run(async move {
                with_config_restore(|original| async move {
                    let target = if original.brightness == 42 { 43 } else { 42 };
                    let returned = ctx().client.set_config_field("brightness", json!(target)).await?;
                    ensure!(returned.brightness == target, "POST returned {}", returned.brightness);

                    let after = ctx().client.get_config().await?;
                    ensure!(after.brightness == target, "GET returned {}", after.brightness);
                    ensure!(
                        after.led_rows == original.led_rows && after.source_dir == original.source_dir,
                        "unrelated fields changed"
                    );
                    Ok(())
                })
                .await
            })
        })
        .with_ignored_flag(!writable),
        Trial::test("config::snake_case_field_names_accepted", move || {
            run(async move {
                with_config_restore(|original| async move {
                    let target = if original.slide_seconds == 7 { 8 } else { 7 };
                    let returned = ctx()
                        .client
                        .set_config_field("slide_seconds", json!(target))
                        .await?;
                    ensure!(returned.slide_seconds == target, "slide_seconds not applied");
                    Ok(())
                })
                .await
            })
        })
        .with_ignored_flag(!writable),
        Trial::test("config::center_toggle_round_trips", move || {
            run(async move {
                with_config_restore(|original| async move {
                    let returned = ctx()
                        .client
                        .set_config_field("center", json!(!original.center))
                        .await?;
                    ensure!(returned.center != original.center, "center not applied");
                    let after = ctx().client.get_config().await?;
                    ensure!(after.center == returned.center, "GET disagrees with POST");
                    Ok(())
                })
                .await
            })
        })
        .with_ignored_flag(!writable),
        Trial::test("config::out_of_range_rejected", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let before = ctx().client.get_config().await?;
                for (field, value) in [
                    ("brightness", json!(150)),
                    ("brightness", json!(-1)),
                    ("slowdown", json!(5)),
                    ("slowdown", json!(-2)),
                    ("led-chain", json!(0)),
                ] {
                    let resp = ctx().client.set_config_field_raw(field, value.clone()).await?;
                    ensure!(
                        resp.status() == StatusCode::BAD_REQUEST,
                        "{field}={value}: expected 400, got {}",
                        resp.status()
                    );
                    let body = error_body(resp).await?;
                    ensure!(!body.error.is_empty(), "empty error message");
                }
                let after = ctx().client.get_config().await?;
                ensure!(after == before, "config changed after rejected updates");
                Ok(())
            })
        }),
        Trial::test("config::wrong_type_rejected", move || {
            run(async {
                ensure!(http, "no HTTP access");
                for (field, value) in [
                    ("brightness", json!("abc")),
                    ("brightness", json!(50.5)),
                    ("gpio-mapping", json!(3)),
                    ("source-dir", json!(null)),
                    ("center", json!("yes")),
                ] {
                    let resp = ctx().client.set_config_field_raw(field, value.clone()).await?;
                    ensure!(
                        resp.status() == StatusCode::BAD_REQUEST,
                        "{field}={value}: expected 400, got {}",
                        resp.status()
                    );
                }
                Ok(())
            })
        }),
        Trial::test("config::nonexistent_source_dir_rejected", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let resp = ctx()
                    .client
                    .set_config_field_raw("source-dir", json!("/no/such/marquee/dir"))
                    .await?;
                ensure!(
                    resp.status() == StatusCode::BAD_REQUEST,
                    "expected 400, got {}",
                    resp.status()
                );
                Ok(())
            })
        }),
        Trial::test("config::unknown_field_is_404", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let resp = ctx().client.set_config_field_raw("volume", json!(11)).await?;
                ensure!(
                    resp.status() == StatusCode::NOT_FOUND,
                    "expected 404, got {}",
                    resp.status()
                );
                Ok(())
            })
        }),
    ]
}
