//! End-to-end tests for tariffscan.
//!
//! Parsing tests run on plain-text rate summaries in `tests/fixtures/`, so no
//! pdfium library is needed. Source-resolution tests serve documents from a
//! throwaway HTTP server on 127.0.0.1.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tariffscan::{
    parse_bytes, parse_text, resolve_and_parse, resolve_source, Catalog, ClockRange, DocumentFormat,
    FieldIssue, ParseConfig, ResolutionObserver, ResolverConfig, Retrieval, ScheduleWarning,
    SeasonCalendar, SourceDescriptor, SourceRef, TariffError, TouPeriod,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixtures_dir().join(name)).unwrap()
}

fn remote(base: &str, path: &str) -> SourceRef {
    format!("{base}{path}").parse().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn hm(h: u32, m: u32) -> chrono::NaiveTime {
    chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One canned HTTP response.
#[derive(Clone)]
struct Route {
    path: &'static str,
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
    /// Number of leading requests answered with 503 before the real response.
    fail_first: usize,
}

impl Route {
    fn ok(path: &'static str, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            status: "200 OK",
            content_type,
            body: body.into(),
            fail_first: 0,
        }
    }
}

/// Minimal HTTP/1.1 server: one request per connection, unknown paths get 404.
/// Returns the base URL and a per-path hit counter.
async fn serve(routes: Vec<Route>) -> (String, Arc<Mutex<Vec<&'static str>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let routes = Arc::new(routes);
    let log = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let routes = routes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, content_type, body) = match routes.iter().find(|r| r.path == path) {
                    Some(route) => {
                        let seen = {
                            let mut log = log.lock().unwrap();
                            log.push(route.path);
                            log.iter().filter(|p| **p == route.path).count()
                        };
                        if seen <= route.fail_first {
                            ("503 Service Unavailable", "text/plain", b"busy".to_vec())
                        } else {
                            (route.status, route.content_type, route.body.clone())
                        }
                    }
                    None => ("404 Not Found", "text/html", b"<html>not found</html>".to_vec()),
                };
                let header = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), hits)
}

/// A server that accepts connections and never answers.
async fn serve_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

fn text_resolver() -> tariffscan::ResolverConfigBuilder {
    ResolverConfig::builder()
        .expected_format(DocumentFormat::PlainText)
        .retry_backoff_ms(10)
        .timeout_secs(5)
}

// ── Parsing ──────────────────────────────────────────────────────────────────

#[test]
fn rate_summary_end_to_end() {
    init_tracing();
    let out = parse_text(&fixture("co_summary_2025-04-01.txt"), &ParseConfig::default()).unwrap();
    let s = &out.schedule;
    let d = &out.diagnostics;

    assert_eq!(s.fixed_charge("monthly_service").map(|c| c.amount), Some(13.13));
    assert_eq!(s.rate("summer"), Some(0.07425));
    assert_eq!(s.rate("winter"), Some(0.05565));
    assert_eq!(s.effective_date(), Some(date(2025, 4, 1)));
    for field in [
        "fixed_charges.monthly_service",
        "rates.summer",
        "rates.winter",
        "effective_date",
    ] {
        assert!(!d.is_unresolved(field), "{field} unresolved: {:?}", d.unresolved);
        assert!(d.matched.contains_key(field), "{field} has no match trace");
    }

    assert_eq!(s.tou_rate("summer", TouPeriod::Peak), Some(0.13907));
    assert_eq!(s.tou_rate("summer", TouPeriod::Shoulder), Some(0.09516));
    assert_eq!(s.tou_rate("summer", TouPeriod::OffPeak), Some(0.05126));
    assert_eq!(s.tou_rate("winter", TouPeriod::Peak), Some(0.08434));
    assert_eq!(s.tou_rate("winter", TouPeriod::Shoulder), Some(0.06781));
    assert_eq!(s.tou_rate("winter", TouPeriod::OffPeak), Some(0.04765));

    assert_eq!(
        s.tou_periods().get(&TouPeriod::Peak),
        Some(&ClockRange::new(hm(15, 0), hm(19, 0)))
    );
    assert_eq!(
        s.tou_periods().get(&TouPeriod::Shoulder),
        Some(&ClockRange::new(hm(13, 0), hm(15, 0)))
    );

    let summer: Vec<u32> = s.seasons().months("summer").unwrap().iter().copied().collect();
    assert_eq!(summer, [6, 7, 8, 9]);
    assert_eq!(s.seasons().season_for(5), Some("winter"));
    assert_eq!(s.holidays().len(), 6);
    assert!(s.holidays().contains("Christmas Day"));
    assert!(s.holidays().contains("New Year's Day"));

    assert!(d.warnings.is_empty(), "warnings: {:?}", d.warnings);
    // Only the demand charge is absent from a residential summary.
    let unresolved: Vec<&str> = d.unresolved.iter().map(FieldIssue::field).collect();
    assert_eq!(unresolved, ["fixed_charges.demand"]);
}

#[test]
fn parsed_schedule_prices_points_in_time() {
    use tariffscan::calendar::{rate_at, tou_period_at};

    let out = parse_text(&fixture("co_summary_2025-04-01.txt"), &ParseConfig::default()).unwrap();
    let s = &out.schedule;
    let at = |y, m, d, h| date(y, m, d).and_time(hm(h, 0));

    // Tuesday in July.
    assert_eq!(tou_period_at(s, at(2025, 7, 15, 16)), TouPeriod::Peak);
    assert_eq!(rate_at(s, at(2025, 7, 15, 16)), Some(0.13907));
    assert_eq!(rate_at(s, at(2025, 7, 15, 14)), Some(0.09516));
    assert_eq!(rate_at(s, at(2025, 7, 15, 9)), Some(0.05126));
    // Saturday, Independence Day (a Friday) and Labor Day are off-peak all day.
    assert_eq!(tou_period_at(s, at(2025, 7, 19, 16)), TouPeriod::OffPeak);
    assert_eq!(tou_period_at(s, at(2025, 7, 4, 16)), TouPeriod::OffPeak);
    assert_eq!(rate_at(s, at(2025, 9, 1, 17)), Some(0.05126));
    // Winter weekday peak.
    assert_eq!(rate_at(s, at(2025, 1, 15, 16)), Some(0.08434));
}

#[test]
fn tiered_schedule_keeps_both_blocks() {
    use tariffscan::calendar::rate_at;

    let out = parse_text(&fixture("tiered_summary.txt"), &ParseConfig::default()).unwrap();
    let s = &out.schedule;
    let d = &out.diagnostics;

    assert_eq!(s.tier_rate("summer", 1), Some(0.06));
    assert_eq!(s.tier_rate("summer", 2), Some(0.09));
    assert_eq!(s.rate("summer"), None);
    assert_eq!(s.rate("winter"), Some(0.05565));
    assert_eq!(s.rate("standard"), Some(0.07));
    assert!(s.tiered_rates().get("winter").is_none());
    assert_eq!(s.fixed_charge("monthly_service").map(|c| c.amount), Some(7.1));
    assert_eq!(s.effective_date(), Some(date(2025, 10, 1)));

    // A tiered season is not reported as missing its flat rate.
    assert!(
        !d.unresolved.iter().any(|i| i.field().starts_with("rates.")),
        "unresolved: {:?}",
        d.unresolved
    );
    assert!(d.matched.contains_key("rates.summer.tier_2"));

    let at = |y, m, d| date(y, m, d).and_time(hm(12, 0));
    assert_eq!(rate_at(s, at(2025, 7, 15)), Some(0.06));
    assert_eq!(rate_at(s, at(2025, 1, 15)), Some(0.05565));
}

#[test]
fn word_clock_times_share_no_meridiem() {
    let text = "DEFINITION OF BILLING PERIODS\n\
                On-Peak: noon to 7 p.m. weekdays\n\
                Shoulder: midnight to 6:00 a.m.\n";
    let out = parse_text(text, &ParseConfig::default()).unwrap();
    let periods = out.schedule.tou_periods();
    assert_eq!(periods.get(&TouPeriod::Peak), Some(&ClockRange::new(hm(12, 0), hm(19, 0))));
    assert_eq!(periods.get(&TouPeriod::Shoulder), Some(&ClockRange::new(hm(0, 0), hm(6, 0))));
    assert!(!out.diagnostics.is_unresolved("tou_periods.shoulder"));
}

#[test]
fn parsing_is_idempotent() {
    let bytes = fixture("co_summary_2025-04-01.txt").into_bytes();
    let config = ParseConfig::default();
    let a = parse_bytes(&bytes, &config).unwrap().to_json_pretty().unwrap();
    let b = parse_bytes(&bytes, &config).unwrap().to_json_pretty().unwrap();
    assert_eq!(a, b);
}

#[test]
fn cents_and_dollars_normalize_identically() {
    let config = ParseConfig::default();
    let cents = parse_text(&fixture("cents_summary.txt"), &config).unwrap();
    let dollars = parse_text(&fixture("co_summary_2025-04-01.txt"), &config).unwrap();
    assert_eq!(cents.schedule.rate("summer"), dollars.schedule.rate("summer"));
    assert_eq!(cents.schedule.rate("winter"), dollars.schedule.rate("winter"));
    assert_eq!(cents.schedule.rate("summer"), Some(0.07425));
}

#[test]
fn missing_tou_period_is_reported_not_dropped() {
    let out = parse_text(&fixture("tou_incomplete.txt"), &ParseConfig::default()).unwrap();
    assert_eq!(out.schedule.tou_rate("winter", TouPeriod::Peak), Some(0.08434));
    assert_eq!(out.schedule.tou_rate("winter", TouPeriod::OffPeak), Some(0.04765));
    assert_eq!(out.schedule.tou_rate("summer", TouPeriod::Shoulder), Some(0.09516));
    assert!(out.diagnostics.warnings.contains(&ScheduleWarning::ScheduleIncomplete {
        season: "winter".into(),
        missing: vec!["shoulder".into()],
    }));
    assert!(out.diagnostics.is_unresolved("tou_rates.winter.shoulder"));
}

#[test]
fn repeated_tables_last_occurrence_wins() {
    let out = parse_text(&fixture("repeated_tables.txt"), &ParseConfig::default()).unwrap();
    assert_eq!(out.schedule.rate("summer"), Some(0.07425));
    assert_eq!(out.schedule.rate("winter"), Some(0.05565));
    assert!(out.diagnostics.is_ambiguous("rates.summer"));
    let amb = out
        .diagnostics
        .ambiguous
        .iter()
        .find(|a| a.field == "rates.summer")
        .unwrap();
    assert_eq!(amb.superseded.len(), 1);
    assert_eq!(amb.superseded[0].raw, "$0.07000");
}

#[test]
fn negative_and_impossible_values_are_unresolved() {
    let out = parse_text(&fixture("negative_rate.txt"), &ParseConfig::default()).unwrap();
    assert_eq!(out.schedule.rate("summer"), None);
    assert_eq!(out.schedule.rate("winter"), Some(0.05565));
    assert_eq!(out.schedule.effective_date(), None);

    let rejected: Vec<&str> = out
        .diagnostics
        .unresolved
        .iter()
        .filter_map(|i| match i {
            FieldIssue::NegativeOrMalformedValue { field, .. } => Some(field.as_str()),
            FieldIssue::FieldUnresolved { .. } => None,
        })
        .collect();
    assert!(rejected.contains(&"rates.summer"), "got {rejected:?}");
    assert!(rejected.contains(&"effective_date"), "got {rejected:?}");
}

#[test]
fn configured_season_calendar_fills_undefined_seasons() {
    let text = "Summer Season\nAll kWh per month $0.07425\n";
    let config = ParseConfig::builder()
        .season_calendar(SeasonCalendar::parse("summer=7-8;winter=1-6,9-12").unwrap())
        .build()
        .unwrap();
    let out = parse_text(text, &config).unwrap();
    assert_eq!(out.schedule.seasons().season_for(6), Some("winter"));
    assert_eq!(out.schedule.seasons().season_for(7), Some("summer"));
}

#[test]
fn binary_garbage_is_unreadable() {
    let err = parse_bytes(&[0u8, 159, 146, 150, 0, 1], &ParseConfig::default()).unwrap_err();
    assert!(matches!(err, TariffError::UnreadableDocument { .. }), "got {err:?}");
}

#[test]
fn json_output_shape() {
    let out = parse_text(&fixture("co_summary_2025-04-01.txt"), &ParseConfig::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out.to_json_pretty().unwrap()).unwrap();
    let schedule = &value["schedule"];
    assert!(schedule["rates"]["summer"].is_number());
    assert!(schedule["tou_rates"]["winter"]["off_peak"].is_number());
    assert_eq!(schedule["tou_periods"]["peak"]["start"], "15:00:00");
    assert_eq!(schedule["effective_date"], "2025-04-01");
    assert_eq!(schedule["provenance"]["retrieval"]["kind"], "in_memory");
    assert_eq!(value["diagnostics"]["matched"]["rates.summer"]["raw"], "$0.07425");
}

// ── Source resolution ────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_local_falls_through_to_url() {
    init_tracing();
    let body = fixture("co_summary_2025-04-01.txt");
    let route = Route::ok("/b.txt", "text/plain; charset=utf-8", body.clone());
    let (base, hits) = serve(vec![route]).await;
    let data = tempfile::tempdir().unwrap();

    let candidates = vec![
        SourceDescriptor::new(SourceRef::LocalFile("a.txt".into()), date(2025, 1, 1), "local A"),
        SourceDescriptor::new(remote(&base, "/b.txt"), date(2024, 5, 1), "url B"),
    ];
    let resolver = text_resolver().data_dir(data.path()).build().unwrap();

    let doc = resolve_source(&candidates, &resolver).await.unwrap();
    assert_eq!(doc.bytes(), body.as_bytes());
    assert_eq!(doc.descriptor().description, "url B");
    assert!(matches!(doc.retrieval(), Retrieval::Downloaded { .. }));
    assert_eq!(hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_and_parse_carries_provenance() {
    let (base, _) = serve(vec![Route::ok(
        "/summary.txt",
        "text/plain",
        fixture("co_summary_2025-04-01.txt"),
    )])
    .await;
    let candidate =
        SourceDescriptor::new(remote(&base, "/summary.txt"), date(2025, 4, 1), "summary")
            .with_version("2025-Q2");
    let resolver = text_resolver().build().unwrap();

    let out = resolve_and_parse(&[candidate], &resolver, &ParseConfig::default())
        .await
        .unwrap();
    let prov = out.schedule.provenance();
    assert_eq!(prov.source.as_ref().unwrap().version.as_deref(), Some("2025-Q2"));
    assert_eq!(prov.library_version, tariffscan::STANDARD_LIBRARY_VERSION);
    assert_eq!(out.schedule.rate("summer"), Some(0.07425));
}

#[tokio::test]
async fn http_errors_and_wrong_content_fall_through() {
    let (base, _) = serve(vec![
        Route::ok("/page.txt", "text/html", "<html>rates moved</html>"),
        Route::ok("/binary.txt", "application/octet-stream", vec![0u8, 1, 2, 3]),
        Route::ok("/good.txt", "text/plain", fixture("cents_summary.txt")),
    ])
    .await;
    let url = |p: &str| -> SourceRef { format!("{base}{p}").parse().unwrap() };
    let candidates = vec![
        SourceDescriptor::new(url("/gone.txt"), date(2025, 4, 1), "404"),
        SourceDescriptor::new(url("/page.txt"), date(2025, 3, 1), "html"),
        SourceDescriptor::new(url("/binary.txt"), date(2025, 2, 1), "binary"),
        SourceDescriptor::new(url("/good.txt"), date(2025, 1, 1), "good"),
    ];
    let resolver = text_resolver().max_retries(0).build().unwrap();
    let doc = resolve_source(&candidates, &resolver).await.unwrap();
    assert_eq!(doc.descriptor().description, "good");

    match resolve_source(&candidates[..3], &resolver).await {
        Err(TariffError::NoAvailableSource { attempts }) => {
            assert_eq!(attempts.len(), 3);
            assert!(attempts[0].reason.contains("404"), "{}", attempts[0].reason);
            assert!(attempts[1].reason.contains("content type"), "{}", attempts[1].reason);
            assert!(attempts[2].reason.contains("not a plain_text"), "{}", attempts[2].reason);
        }
        other => panic!("expected NoAvailableSource, got {other:?}"),
    }
}

#[derive(Default)]
struct RetryCounter(AtomicUsize);

impl ResolutionObserver for RetryCounter {
    fn on_retry(&self, _source: &str, _attempt: u32, _max_retries: u32) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let mut flaky = Route::ok("/flaky.txt", "text/plain", fixture("cents_summary.txt"));
    flaky.fail_first = 2;
    let (base, hits) = serve(vec![flaky]).await;
    let counter = Arc::new(RetryCounter::default());
    let candidate = SourceDescriptor::new(remote(&base, "/flaky.txt"), date(2025, 4, 1), "");

    let resolver = text_resolver()
        .max_retries(2)
        .observer(counter.clone())
        .build()
        .unwrap();
    let doc = resolve_source(std::slice::from_ref(&candidate), &resolver).await.unwrap();
    assert!(doc.bytes().starts_with(b"Effective"));
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    assert_eq!(hits.lock().unwrap().len(), 3);
}

#[derive(Default)]
struct FailureLog(Mutex<Vec<String>>);

impl ResolutionObserver for FailureLog {
    fn on_candidate_failed(&self, _index: usize, _total: usize, _source: &str, reason: &str) {
        self.0.lock().unwrap().push(reason.to_string());
    }
}

#[tokio::test]
async fn unresponsive_server_times_out_and_falls_through() {
    init_tracing();
    let silent = serve_silent().await;
    let good = Route::ok("/good.txt", "text/plain", fixture("cents_summary.txt"));
    let (base, _) = serve(vec![good]).await;
    let failures = Arc::new(FailureLog::default());
    let candidates = vec![
        SourceDescriptor::new(remote(&silent, "/hang.txt"), date(2025, 4, 1), "hang"),
        SourceDescriptor::new(remote(&base, "/good.txt"), date(2025, 1, 1), "good"),
    ];
    let resolver = text_resolver()
        .timeout_secs(1)
        .max_retries(0)
        .observer(failures.clone())
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let doc = resolve_source(&candidates, &resolver).await.unwrap();
    assert_eq!(doc.descriptor().description, "good");
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    let reasons = failures.0.lock().unwrap().clone();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("timed out"), "{}", reasons[0]);

    match resolve_source(&candidates[..1], &resolver).await {
        Err(TariffError::NoAvailableSource { attempts }) => {
            assert_eq!(attempts.len(), 1);
            assert!(attempts[0].reason.contains("timed out"), "{}", attempts[0].reason);
        }
        other => panic!("expected NoAvailableSource, got {other:?}"),
    }
}

#[tokio::test]
async fn retries_are_bounded() {
    let mut down = Route::ok("/down.txt", "text/plain", "never served");
    down.fail_first = usize::MAX;
    let (base, hits) = serve(vec![down]).await;
    let candidate = SourceDescriptor::new(remote(&base, "/down.txt"), date(2025, 4, 1), "");
    let resolver = text_resolver().max_retries(1).build().unwrap();

    let err = resolve_source(&[candidate], &resolver).await.unwrap_err();
    assert!(err.to_string().contains("503"), "got {err}");
    assert_eq!(hits.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn downloads_are_cached_and_reused() {
    let route = Route::ok("/cached.txt", "text/plain", fixture("cents_summary.txt"));
    let (base, hits) = serve(vec![route]).await;
    let cache = tempfile::tempdir().unwrap();
    let candidate = SourceDescriptor::new(remote(&base, "/cached.txt"), date(2025, 4, 1), "");
    let resolver = text_resolver().cache_dir(cache.path()).build().unwrap();

    let first = resolve_source(std::slice::from_ref(&candidate), &resolver).await.unwrap();
    assert!(matches!(first.retrieval(), Retrieval::Downloaded { .. }));
    let second = resolve_source(std::slice::from_ref(&candidate), &resolver).await.unwrap();
    assert!(matches!(second.retrieval(), Retrieval::Cached { .. }));
    assert_eq!(first.bytes(), second.bytes());
    assert_eq!(hits.lock().unwrap().len(), 1);
    assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 1);
}

#[test]
fn sync_wrapper_resolves_local_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(
        fixtures_dir().join("co_summary_2025-04-01.txt"),
        dir.path().join("co_summary_2025-04-01.txt"),
    )
    .unwrap();
    let resolver = text_resolver().data_dir(dir.path()).build().unwrap();
    let candidate = SourceDescriptor::new(
        "file://co_summary_2025-04-01.txt".parse().unwrap(),
        date(2025, 4, 1),
        "bundled",
    );
    let out =
        tariffscan::resolve_and_parse_sync(&[candidate], &resolver, &ParseConfig::default())
            .unwrap();
    assert_eq!(out.schedule.fixed_charge("monthly_service").map(|c| c.amount), Some(13.13));
    assert!(matches!(
        out.schedule.provenance().retrieval,
        Retrieval::Bundled { .. }
    ));
}

// ── Catalog ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn catalog_drives_resolution_newest_first() {
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("old.txt"), fixture("repeated_tables.txt")).unwrap();
    let catalog_path = data.path().join("sources.json");

    let mut catalog = Catalog::new();
    catalog.upsert(
        "xcel_energy",
        "electric",
        SourceDescriptor::new("file://old.txt".parse().unwrap(), date(2024, 5, 1), "old"),
    );
    catalog.upsert(
        "xcel_energy",
        "electric",
        SourceDescriptor::new(
            "file://missing_2025.txt".parse().unwrap(),
            date(2025, 4, 1),
            "newer, not bundled",
        ),
    );
    catalog.save(&catalog_path).unwrap();

    let loaded = Catalog::load(&catalog_path).unwrap();
    let candidates = loaded.candidates("xcel_energy", "electric");
    assert_eq!(candidates[0].description, "newer, not bundled");

    let resolver = text_resolver().data_dir(data.path()).build().unwrap();
    let out = resolve_and_parse(&candidates, &resolver, &ParseConfig::default())
        .await
        .unwrap();
    assert_eq!(out.schedule.provenance().source.as_ref().unwrap().description, "old");
    assert_eq!(out.schedule.rate("winter"), Some(0.05565));
}
