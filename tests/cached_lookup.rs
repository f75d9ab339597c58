use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use csvsearch::census::{BroadbandKey, CensusSource, Lookup, Source};
use csvsearch::{Error, Result};

// counts fetches and answers with the key length, or fails on "bad"
struct Counting {
    calls: AtomicUsize,
}

impl Counting {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Source for Counting {
    type Key = String;
    type Value = usize;

    async fn fetch(&self, key: &String) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key == "bad" {
            return Err(Error::Fetch("no such key".into()));
        }
        Ok(key.len())
    }
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let lookup = Lookup::new(Counting::new(), 10, Duration::from_secs(60));
    assert_eq!(lookup.get(&"Providence".to_string()).await.expect("fetched"), 10);
    assert_eq!(lookup.get(&"Providence".to_string()).await.expect("cached"), 10);
    assert_eq!(lookup.source().calls(), 1);
    assert_eq!(lookup.cached_len().expect("lock"), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let lookup = Lookup::new(Counting::new(), 10, Duration::from_secs(60));
    assert!(lookup.get(&"bad".to_string()).await.is_err());
    assert!(lookup.get(&"bad".to_string()).await.is_err());
    assert_eq!(lookup.source().calls(), 2);
    assert_eq!(lookup.cached_len().expect("lock"), 0);
}

#[tokio::test]
async fn expired_values_are_fetched_again() {
    let lookup = Lookup::new(Counting::new(), 10, Duration::from_millis(20));
    lookup.get(&"Kent".to_string()).await.expect("fetched");
    std::thread::sleep(Duration::from_millis(60));
    lookup.get(&"Kent".to_string()).await.expect("refetched");
    assert_eq!(lookup.source().calls(), 2);
}

#[tokio::test]
async fn capacity_bounds_the_cache() {
    let lookup = Lookup::new(Counting::new(), 2, Duration::from_secs(60));
    for key in ["a", "bb", "ccc"] {
        lookup.get(&key.to_string()).await.expect("fetched");
    }
    assert_eq!(lookup.cached_len().expect("lock"), 2);
    // "a" was written first and made room for "ccc"
    lookup.get(&"a".to_string()).await.expect("fetched");
    assert_eq!(lookup.source().calls(), 4);
}

// yields a few times mid-fetch so concurrent callers interleave
struct Slow {
    calls: AtomicUsize,
}

impl Source for Slow {
    type Key = String;
    type Value = usize;

    async fn fetch(&self, key: &String) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        if key == "bad" {
            return Err(Error::Fetch("no such key".into()));
        }
        Ok(key.len())
    }
}

#[tokio::test]
async fn concurrent_misses_share_one_fetch() {
    let lookup = Lookup::new(Slow { calls: AtomicUsize::new(0) }, 10, Duration::from_secs(60));
    let key = "Washington".to_string();
    let (first, second, third) = tokio::join!(lookup.get(&key), lookup.get(&key), lookup.get(&key));
    assert_eq!(first.expect("fetched"), 10);
    assert_eq!(second.expect("waited"), 10);
    assert_eq!(third.expect("waited"), 10);
    assert_eq!(lookup.source().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn waiters_behind_a_failure_fetch_again() {
    let lookup = Lookup::new(Slow { calls: AtomicUsize::new(0) }, 10, Duration::from_secs(60));
    let key = "bad".to_string();
    let (first, second) = tokio::join!(lookup.get(&key), lookup.get(&key));
    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(lookup.source().calls.load(Ordering::SeqCst), 2);
    assert_eq!(lookup.cached_len().expect("lock"), 0);
}

#[tokio::test]
async fn different_keys_fetch_independently() {
    let lookup = Lookup::new(Slow { calls: AtomicUsize::new(0) }, 10, Duration::from_secs(60));
    let (a, b) = ("Kent".to_string(), "Bristol".to_string());
    let (first, second) = tokio::join!(lookup.get(&a), lookup.get(&b));
    assert_eq!(first.expect("fetched"), 4);
    assert_eq!(second.expect("fetched"), 7);
    assert_eq!(lookup.source().calls.load(Ordering::SeqCst), 2);
}

#[test]
fn broadband_key_display() {
    let key = BroadbandKey::new("Rhode Island", "Providence County");
    assert_eq!(key.to_string(), "Rhode Island:Providence County");
}

// A stand-in for the Census API, shaped like its array-of-arrays answers.
async fn census_sf1(
    State(hits): State<Arc<AtomicUsize>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let scope = params.get("for").map(String::as_str);
    let within = params.get("in").map(String::as_str);
    match (scope, within) {
        (Some("state:*"), _) => {
            hits.fetch_add(1, Ordering::SeqCst);
            Json(json!([["NAME", "state"], ["Rhode Island", "44"], ["New York", "36"]]))
        }
        (Some("county:*"), Some("state:44")) => Json(json!([
            ["NAME", "state", "county"],
            ["Kent County, Rhode Island", "44", "003"],
            ["Providence County, Rhode Island", "44", "007"]
        ])),
        _ => Json(json!([["NAME", "state", "county"]])),
    }
}

async fn census_acs(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("for").map(String::as_str) {
        Some("county:007") => Json(json!([
            ["NAME", "S2802_C03_022E", "state", "county"],
            ["Providence County, Rhode Island", "85.4", "44", "007"]
        ])),
        Some("county:003") => Json(json!([
            ["NAME", "S2802_C03_022E", "state", "county"],
            ["Kent County, Rhode Island", null, "44", "003"]
        ])),
        _ => Json(json!([["NAME", "S2802_C03_022E", "state", "county"]])),
    }
}

async fn fake_census() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/data/2010/dec/sf1", get(census_sf1))
        .route("/data/2021/acs/acs1/subject/variables", get(census_acs))
        .with_state(Arc::clone(&hits));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{address}/"), hits)
}

#[tokio::test]
async fn census_source_resolves_names_to_codes() {
    let (base, state_hits) = fake_census().await;
    let source = CensusSource::new(base).expect("client");
    let found = source
        .fetch(&BroadbandKey::new("Rhode Island", "Providence County, Rhode Island"))
        .await
        .expect("estimate");
    assert_eq!(found.percentage, 85.4);
    // the short county name works too, and state codes are fetched once
    let again = source
        .fetch(&BroadbandKey::new("Rhode Island", "Providence County"))
        .await
        .expect("estimate");
    assert_eq!(again.percentage, 85.4);
    assert_eq!(state_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn census_source_reports_unknown_names() {
    let (base, _) = fake_census().await;
    let source = CensusSource::new(base).expect("client");
    let err = source.fetch(&BroadbandKey::new("Atlantis", "Kent County")).await.unwrap_err();
    assert!(err.to_string().contains("unknown state 'Atlantis'"), "{err}");
    let err = source.fetch(&BroadbandKey::new("Rhode Island", "Gotham")).await.unwrap_err();
    assert!(err.to_string().contains("unknown county 'Gotham'"), "{err}");
}

#[tokio::test]
async fn census_source_rejects_empty_and_malformed_answers() {
    let (base, _) = fake_census().await;
    let source = CensusSource::new(base).expect("client");
    // the county exists but the estimate is null
    let err = source.fetch(&BroadbandKey::new("Rhode Island", "Kent County")).await.unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
    // no counties at all for this state
    let err = source.fetch(&BroadbandKey::new("New York", "Kings County")).await.unwrap_err();
    assert!(err.to_string().contains("No data returned"), "{err}");
}

#[tokio::test]
async fn lookup_over_census_source_caches() {
    let (base, state_hits) = fake_census().await;
    let lookup = Lookup::new(CensusSource::new(base).expect("client"), 10, Duration::from_secs(60));
    let key = BroadbandKey::new("Rhode Island", "Providence County");
    let first = lookup.get(&key).await.expect("estimate");
    let second = lookup.get(&key).await.expect("estimate");
    assert_eq!(first, second, "cached values keep their retrieval time");
    assert_eq!(state_hits.load(Ordering::SeqCst), 1);
}
