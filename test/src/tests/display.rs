use anyhow::{Context, Result, ensure};
use libtest_mimic::Trial;
use reqwest::StatusCode;
use serde_json::json;

use crate::capabilities::Capabilities;
use crate::context::{ctx, run, run_slow};
use crate::tests::media::any_media;

/// Runs `f` and stops the display afterwards, whatever `f` returned.
async fn with_stop<Fut>(f: Fut) -> Result<()>
where
    Fut: std::future::Future<Output = Result<()>>,
{
    let result = f.await;
    if let Err(e) = ctx().client.stop().await {
        eprintln!("  WARNING: stop after test failed: {e:#}");
    }
    result
}

pub fn register(caps: &Capabilities) -> Vec<Trial> {
    let http = caps.http;
    let has_folders = caps.has_folders;
    vec![
        Trial::test("display::text_reports_running", move || {
            run(with_stop(async {
                ensure!(http, "no HTTP access");
                let status = ctx().client.display_text("marquee acceptance").await?;
                ensure!(status.is_running(), "state is {}", status.state);
                ensure!(status.renderer.as_deref() == Some("text"), "renderer {:?}", status.renderer);
                ensure!(status.pid.is_some(), "no pid");
                ensure!(status.started_at.is_some(), "no started_at");
                ensure!(
                    status.args.last().map(String::as_str) == Some("marquee acceptance"),
                    "text is not the last argument: {:?}",
                    status.args
                );

                let polled = ctx().client.get_status().await?;
                ensure!(polled.pid == status.pid, "status pid {:?} != {:?}", polled.pid, status.pid);
                Ok(())
            }))
        }),
        Trial::test("display::new_request_replaces_renderer", move || {
            run_slow(with_stop(async {
                ensure!(http, "no HTTP access");
                let first = ctx().client.display_text("first").await?;
                let second = ctx().client.display_text("second").await?;
                ensure!(first.pid != second.pid, "pid did not change");
                let polled = ctx().client.get_status().await?;
                ensure!(polled.pid == second.pid, "status shows an older renderer");
                Ok(())
            }))
        }),
        Trial::test("display::text_options_applied", move || {
            run(with_stop(async {
                ensure!(http, "no HTTP access");
                let resp = ctx()
                    .client
                    .display_raw(
                        "text",
                        json!({ "text": "colors", "color": "0,255,128", "speed": 2.5 }),
                    )
                    .await?;
                ensure!(resp.status() == StatusCode::OK, "got {}", resp.status());
                let status: crate::types::Status = resp.json().await?;
                ensure!(
                    status.args.windows(2).any(|w| w[0] == "-C" && w[1] == "0,255,128"),
                    "color missing from {:?}",
                    status.args
                );
                ensure!(
                    status.args.windows(2).any(|w| w[0] == "-s" && w[1] == "2.5"),
                    "speed missing from {:?}",
                    status.args
                );
                Ok(())
            }))
        }),
        Trial::test("display::stop_returns_idle", move || {
            run_slow(async {
                ensure!(http, "no HTTP access");
                ctx().client.display_text("about to stop").await?;
                let stopped = ctx().client.stop().await?;
                ensure!(stopped.stopped.is_some(), "nothing was stopped");
                ensure!(stopped.status.state == "idle", "state {}", stopped.status.state);
                let polled = ctx().client.get_status().await?;
                ensure!(!polled.is_running(), "still running after stop");
                Ok(())
            })
        }),
        Trial::test("display::stop_when_idle_is_ok", move || {
            run_slow(async {
                ensure!(http, "no HTTP access");
                ctx().client.stop().await?;
                let again = ctx().client.stop().await?;
                ensure!(again.stopped.is_none(), "stopped {:?} while idle", again.stopped);
                Ok(())
            })
        }),
        Trial::test("display::invalid_text_requests_rejected", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let before = ctx().client.get_status().await?;
                for body in [
                    json!({ "text": "" }),
                    json!({ "text": "  \t " }),
                    json!({ "text": "hi", "color": "purple" }),
                    json!({ "text": "hi", "speed": 0 }),
                ] {
                    let resp = ctx().client.display_raw("text", body.clone()).await?;
                    ensure!(
                        resp.status() == StatusCode::BAD_REQUEST,
                        "{body}: expected 400, got {}",
                        resp.status()
                    );
                }
                let after = ctx().client.get_status().await?;
                ensure!(after.pid == before.pid, "a rejected request changed the renderer");
                Ok(())
            })
        }),
        Trial::test("display::missing_media_is_404", move || {
            run(async {
                ensure!(http, "no HTTP access");
                let resp = ctx()
                    .client
                    .display_raw("media", json!({ "path": "no-such-file-here.gif" }))
                    .await?;
                ensure!(
                    resp.status() == StatusCode::NOT_FOUND,
                    "expected 404, got {}",
                    resp.status()
                );
                Ok(())
            })
        }),
        Trial::test("display::single_media", move || {
            run(with_stop(async {
                ensure!(http, "no HTTP access");
                let name = any_media()
                    .await?
                    .context("no media in the source directory")?;
                let status = ctx().client.display_media(&name).await?;
                ensure!(status.renderer.as_deref() == Some("image"), "renderer {:?}", status.renderer);
                ensure!(
                    status.args.last().is_some_and(|a| a.ends_with(&name)),
                    "{name} is not the last argument: {:?}",
                    status.args
                );
                Ok(())
            }))
        }),
        Trial::test("display::source_dir_slideshow", move || {
            run(with_stop(async {
                ensure!(http, "no HTTP access");
                any_media()
                    .await?
                    .context("no media in the source directory")?;
                let status = ctx().client.display_folder("", false).await?;
                ensure!(status.is_running(), "state is {}", status.state);
                ensure!(
                    status.args.last().is_some_and(|a| a.ends_with("/*")),
                    "unshuffled folder should end in a wildcard: {:?}",
                    status.args
                );
                Ok(())
            }))
        }),
        Trial::test("display::folder_shuffled", move || {
            run(with_stop(async {
                let folder = ctx().client.list_folders().await?.remove(0);
                let resp = ctx()
                    .client
                    .display_raw("folder", json!({ "path": folder, "shuffle": true }))
                    .await?;
                // a folder holding only subdirectories has nothing to shuffle
                ensure!(
                    resp.status() == StatusCode::OK || resp.status() == StatusCode::BAD_REQUEST,
                    "got {}",
                    resp.status()
                );
                if resp.status() == StatusCode::OK {
                    let status: crate::types::Status = resp.json().await?;
                    ensure!(
                        !status.args.iter().any(|a| a.ends_with("/*")),
                        "shuffled folder used a wildcard: {:?}",
                        status.args
                    );
                }
                Ok(())
            }))
        })
        .with_ignored_flag(!has_folders),
    ]
}
