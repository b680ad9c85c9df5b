//! Run-level behavior of the engine against scripted transports.

use std::time::Duration;

use payment_relay::classify::{ExtractionSource, Validity};
use payment_relay::engine::{LaunchError, RunMode};
use payment_relay::observability::Severity;
use payment_relay::resilience::TerminalState;
use payment_relay::transport::types::{AttemptOutcome, TransportKind};

mod common;
use common::{harness, network_error, redirect, response, test_config, Reply, ScriptedTransport};

const PAYLOAD: &str = "appointment_id=77&amount=500";

#[tokio::test(start_paused = true)]
async fn test_non_retryable_statuses_stop_immediately() {
    for status in [401, 429, 403] {
        let primary = ScriptedTransport::always(Reply::Respond(response(status, "denied"))).shared();
        let h = harness(test_config(), primary.clone(), None);

        let report = h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD).await.unwrap();

        assert_eq!(report.runs[0].terminal, TerminalState::StoppedNoRetry);
        assert_eq!(report.runs[0].dispatches, 1);
        assert_eq!(primary.posts(), 1);
        assert!(h.sink.contains(&format!("No retry on HTTP {}", status)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_cap_bounds_dispatches() {
    let mut config = test_config();
    config.retry.max_attempts = Some(3);
    let primary = ScriptedTransport::always(Reply::Respond(response(500, "oops"))).shared();
    let h = harness(config, primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD).await.unwrap();
    let run = &report.runs[0];

    assert_eq!(run.terminal, TerminalState::Exhausted);
    assert_eq!(run.dispatches, 3);
    assert_eq!(run.retries, 3);
    assert_eq!(run.attempts.len(), 3);
    assert_eq!(h.ctx.journal.len(), 3);
    assert!(h.sink.contains("Retry 1 failed (HTTP 500)"));
    assert!(h.sink.contains("Retry 2 failed (HTTP 500)"));
    assert!(!h.sink.contains("Retry 3 failed"));
    assert!(h.sink.contains("failed all 3 attempts"));
    assert_eq!(h.ctx.registry.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_primary_failure_falls_back_to_secondary() {
    let primary = ScriptedTransport::always(network_error()).shared();
    let secondary = ScriptedTransport::always(Reply::Respond(response(
        200,
        "<p>tran_id SBIMU42 status=VALID</p>",
    )))
    .shared();
    let h = harness(test_config(), primary.clone(), Some(secondary.clone()));

    let report = h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();
    assert_eq!(report.runs[0].terminal, TerminalState::Success);

    let entries = h.ctx.journal.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].transport, TransportKind::Primary);
    assert_eq!(entries[0].outcome, AttemptOutcome::Failed);
    assert_eq!(entries[0].status_code, 0);
    assert_eq!(entries[1].transport, TransportKind::Secondary);
    assert_eq!(entries[1].outcome, AttemptOutcome::Ok);
    assert_eq!(entries[1].url, "https://api-pay.test/api/payment/appointment/process");

    let classification = entries[1].classification.clone().unwrap();
    assert_eq!(classification.tran_id.as_deref(), Some("SBIMU42"));
    assert_eq!(classification.validity, Validity::Valid);

    let settings = h.ctx.settings.snapshot();
    assert_eq!(settings.ok_count, 1);
    assert_eq!(settings.last_verified().map(|(id, _)| id), Some("SBIMU42"));
    assert_eq!(
        primary.get_urls(),
        vec!["https://pay.test/payment-response/SBIMU42".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_redirect_is_transport_ok_but_failed_validity() {
    let primary = ScriptedTransport::always(Reply::Respond(redirect(
        "/payment-response?tran_id=SBIMU7&status=FAILED",
    )))
    .shared();
    let h = harness(test_config(), primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();
    let run = &report.runs[0];
    assert_eq!(run.terminal, TerminalState::Success);
    assert_eq!(run.last_status, 302);

    let classification = run.classification.clone().unwrap();
    assert_eq!(classification.validity, Validity::Failed);
    assert_eq!(classification.validity.as_bool(), Some(false));
    assert_eq!(classification.source, ExtractionSource::RedirectLocation);

    let settings = h.ctx.settings.snapshot();
    assert_eq!(settings.redirect_count, 1);
    assert_eq!(settings.ok_count, 0);
    assert!(settings.last_verified().is_none());
    assert!(h.sink.contains("Result for SBIMU7: FAILED"));
    assert_eq!(
        primary.get_urls(),
        vec!["https://pay.test/payment-response?tran_id=SBIMU7&status=FAILED".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_follow_up_is_recorded() {
    let primary = ScriptedTransport::always(Reply::Respond(redirect(
        "https://pay.test/payment-response?tran_id=SBIMU9&status=VALID",
    )))
    .follow_with(response(200, "<h1>Payment status: VALID</h1>"))
    .shared();
    let h = harness(test_config(), primary, None);

    h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();

    let entry = &h.ctx.journal.entries()[0];
    let follow_up = entry.follow_up.clone().unwrap();
    assert_eq!(follow_up.status, Some(200));
    assert!(follow_up.body_preview.contains("VALID"));

    let settings = h.ctx.settings.snapshot();
    assert_eq!(settings.ok_count, 1);
    assert_eq!(settings.redirect_count, 1);
    assert_eq!(settings.last_verified().map(|(id, _)| id), Some("SBIMU9"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_id_is_noted() {
    let primary = ScriptedTransport::always(Reply::Respond(response(200, "thanks"))).shared();
    let h = harness(test_config(), primary.clone(), None);

    h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();

    let entry = &h.ctx.journal.entries()[0];
    assert_eq!(entry.note.as_deref(), Some("TRAN_ID not found"));
    assert!(entry.follow_up.is_none());
    assert!(primary.get_urls().is_empty());
    assert!(h.sink.contains("TRAN_ID not found [HTTP 200]"));
}

#[tokio::test(start_paused = true)]
async fn test_multi_mode_peaks_at_fan_out() {
    let primary = ScriptedTransport::always(Reply::After(
        Duration::from_millis(100),
        response(200, "ok"),
    ))
    .shared();
    let h = harness(test_config(), primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::Multi, PAYLOAD).await.unwrap();

    assert_eq!(report.runs.len(), 5);
    assert!(report.runs.iter().all(|r| r.terminal == TerminalState::Success));
    assert_eq!(h.ctx.registry.peak_in_flight(), 5);
    assert_eq!(h.ctx.registry.in_flight(), 0);
    assert_eq!(primary.posts(), 5);
    assert!(h.sink.contains("Success #5 [200]"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_only_success_stops_everything() {
    let primary = ScriptedTransport::new(
        vec![
            Reply::Respond(response(500, "")),
            Reply::Respond(response(502, "")),
            Reply::Respond(response(200, "done")),
        ],
        Reply::Respond(response(500, "")),
    )
    .shared();
    let h = harness(test_config(), primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.runs[0].dispatches, 3);
    assert_eq!(report.runs[0].retries, 2);
    assert!(h.ctx.is_stopped());
    assert!(h.sink.contains("Success. Aborting all."));
    assert!(h.sink.contains("All operations and retries cancelled"));
    assert_eq!(h.ctx.registry.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_combined_first_success_cancels_siblings() {
    let mut config = test_config();
    config.retry.max_attempts = Some(10);
    let primary = ScriptedTransport::new(
        vec![
            Reply::Respond(response(500, "")),
            Reply::Respond(response(500, "")),
            Reply::Respond(response(200, "done")),
        ],
        Reply::Respond(response(500, "")),
    )
    .shared();
    let h = harness(config, primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::Combined, PAYLOAD).await.unwrap();

    let terminals: Vec<TerminalState> = report.runs.iter().map(|r| r.terminal).collect();
    assert_eq!(
        terminals,
        vec![
            TerminalState::Cancelled,
            TerminalState::Cancelled,
            TerminalState::Success,
            TerminalState::Cancelled,
            TerminalState::Cancelled,
        ]
    );
    assert_eq!(primary.posts(), 3);
    assert_eq!(h.ctx.registry.live_handles(), 0);
    assert_eq!(h.ctx.registry.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_combined_runs_limited_by_cap() {
    let mut config = test_config();
    config.retry.max_attempts = Some(2);
    let primary = ScriptedTransport::always(Reply::Respond(response(500, ""))).shared();
    let h = harness(config, primary.clone(), None);

    let report = h.orchestrator.launch(RunMode::Combined, PAYLOAD).await.unwrap();

    assert_eq!(report.runs.len(), 2);
    assert!(report.runs.iter().all(|r| r.terminal == TerminalState::Exhausted));
    assert_eq!(primary.posts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_global_stop_during_retry_wait() {
    let primary = ScriptedTransport::always(Reply::Respond(response(500, ""))).shared();
    let h = harness(test_config(), primary.clone(), None);

    let (report, _) = tokio::join!(
        h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD),
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            h.ctx.stop_all()
        }
    );
    let run = &report.unwrap().runs[0];

    assert_eq!(run.terminal, TerminalState::Cancelled);
    assert!(run.dispatches >= 2 && run.dispatches <= 4);
    assert_eq!(h.ctx.registry.live_handles(), 0);
    assert_eq!(h.ctx.registry.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_success_during_stop_is_ignored() {
    let primary = ScriptedTransport::always(Reply::Stubborn(
        Duration::from_secs(5),
        response(200, "late"),
    ))
    .shared();
    let h = harness(test_config(), primary, None);

    let (report, _) = tokio::join!(
        h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD),
        async {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            h.ctx.stop_all()
        }
    );

    assert_eq!(report.unwrap().runs[0].terminal, TerminalState::Cancelled);
    assert!(!h.sink.contains("HTTP 200 Success"));
    assert!(!h.sink.contains("Aborting all"));
    assert_eq!(h.ctx.journal.entries()[0].outcome, AttemptOutcome::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_primary_does_not_fall_back() {
    let primary = ScriptedTransport::always(Reply::Hang).shared();
    let secondary = ScriptedTransport::always(Reply::Respond(response(200, ""))).shared();
    let h = harness(test_config(), primary, Some(secondary.clone()));

    let (report, _) = tokio::join!(
        h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            h.ctx.stop_all()
        }
    );

    assert_eq!(report.unwrap().runs[0].terminal, TerminalState::Cancelled);
    assert_eq!(secondary.posts(), 0);
    assert_eq!(h.ctx.journal.entries()[0].outcome, AttemptOutcome::Failed);

    let cancelled = h
        .sink
        .messages()
        .into_iter()
        .find(|m| m.text.contains("primary attempt cancelled"))
        .unwrap();
    assert_eq!(cancelled.severity, Severity::Info);
    assert!(!h.sink.contains("transport failed"));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_disabled() {
    let primary = ScriptedTransport::always(network_error()).shared();
    let secondary = ScriptedTransport::always(Reply::Respond(response(200, ""))).shared();
    let h = harness(test_config(), primary, Some(secondary.clone()));
    h.ctx.set_fallback_allowed(false);

    let report = h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();

    assert_eq!(report.runs[0].terminal, TerminalState::Exhausted);
    assert_eq!(secondary.posts(), 0);
    assert_eq!(h.ctx.journal.len(), 1);
    assert_eq!(h.ctx.fallback_mode_label(), "Fetch-only");
    assert!(h.sink.contains("fallback is disabled"));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_secondary_is_recorded() {
    let primary = ScriptedTransport::always(network_error()).shared();
    let h = harness(test_config(), primary, None);

    h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();

    let entries = h.ctx.journal.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].transport, TransportKind::Secondary);
    assert_eq!(entries[1].outcome, AttemptOutcome::Failed);
    assert!(entries[1].note.as_deref().unwrap().contains("unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_payload_is_rejected() {
    let primary = ScriptedTransport::always(Reply::Respond(response(200, ""))).shared();
    let h = harness(test_config(), primary.clone(), None);

    let result = h.orchestrator.launch(RunMode::Single, "  \n").await;

    assert_eq!(result.unwrap_err(), LaunchError::EmptyPayload);
    assert_eq!(primary.posts(), 0);
    assert!(h.ctx.journal.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delay_edit_applies_to_next_wait() {
    let mut config = test_config();
    config.retry.max_attempts = Some(2);
    let primary = ScriptedTransport::always(Reply::Respond(response(503, ""))).shared();
    let h = harness(config, primary, None);
    h.ctx.edit_delays("0.5").unwrap();

    let started = tokio::time::Instant::now();
    h.orchestrator.launch(RunMode::RetryOnly, PAYLOAD).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(1));
    assert!(h.sink.contains("Retrying in 0.5s"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_flag_clears_after_window() {
    let primary = ScriptedTransport::always(Reply::Respond(response(200, "ok"))).shared();
    let h = harness(test_config(), primary.clone(), None);

    h.ctx.stop_all();
    let report = h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();
    assert_eq!(report.runs[0].terminal, TerminalState::Cancelled);
    assert_eq!(primary.posts(), 0);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    let report = h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();
    assert_eq!(report.runs[0].terminal, TerminalState::Success);
    assert_eq!(primary.posts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_totals_clears_log_and_counters() {
    let primary = ScriptedTransport::always(Reply::Respond(response(200, "SBIMU3 status=VALID"))).shared();
    let h = harness(test_config(), primary, None);
    h.orchestrator.launch(RunMode::Single, PAYLOAD).await.unwrap();
    assert!(!h.ctx.journal.is_empty());

    h.ctx.reset_totals();

    let settings = h.ctx.settings.snapshot();
    assert!(h.ctx.journal.is_empty());
    assert_eq!(settings.ok_count, 0);
    assert!(settings.last_verified().is_none());
}
