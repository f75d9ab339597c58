//! Keyed lookups against a remote statistics service, served through an
//! [`ExpiringCache`].
//!
//! [`Lookup`] is generic over a [`Source`] so the cache policy can be
//! exercised without the network. [`CensusSource`] is the production source:
//! it asks the US Census API for the share of households with broadband in a
//! given county.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// used to stamp values with the time they were fetched
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::debug;

use crate::cache::ExpiringCache;
use crate::error::{Error, Result};

pub const CENSUS_BASE_URL: &str = "https://api.census.gov";

/// Somewhere values can be fetched from when the cache does not have them.
pub trait Source: Send + Sync {
    type Key: Hash + Eq + Clone + fmt::Display + Send + Sync;
    type Value: Clone + Send;
    fn fetch(&self, key: &Self::Key) -> impl Future<Output = Result<Self::Value>> + Send;
}

pub struct Lookup<S: Source> {
    source: S,
    cache: Mutex<ExpiringCache<S::Key, S::Value>>,
    // one fetch at a time per missing key
    flights: Mutex<HashMap<S::Key, Arc<AsyncMutex<()>>>>,
}

impl<S: Source> Lookup<S> {
    pub fn new(source: S, max_entries: usize, ttl: Duration) -> Self {
        Self {
            source,
            cache: Mutex::new(ExpiringCache::new(max_entries, ttl)),
            flights: Mutex::new(HashMap::new()),
        }
    }
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Cached value if it is still fresh, otherwise a fetch that refills the
    /// cache. Concurrent misses on the same key wait for a single fetch and
    /// then read its result from the cache. Failed fetches are not cached, so
    /// a waiter behind a failure fetches again.
    pub async fn get(&self, key: &S::Key) -> Result<S::Value> {
        if let Some(value) = self.cached(key)? {
            debug!(%key, "cache hit");
            return Ok(value);
        }
        let flight = self.flight(key)?;
        let _turn = flight.lock().await;
        if let Some(value) = self.cached(key)? {
            debug!(%key, "cache hit after waiting for another fetch");
            return Ok(value);
        }
        debug!(%key, "cache miss");
        let fetched = self.source.fetch(key).await;
        let stored = match &fetched {
            Ok(value) => self.store(key, value),
            Err(_) => Ok(()),
        };
        self.land(key, &flight)?;
        stored?;
        fetched
    }

    pub fn cached_len(&self) -> Result<usize> {
        Ok(self.cache.lock().map_err(|e| Error::Lock(e.to_string()))?.len())
    }

    fn cached(&self, key: &S::Key) -> Result<Option<S::Value>> {
        Ok(self
            .cache
            .lock()
            .map_err(|e| Error::Lock(e.to_string()))?
            .get(key))
    }

    fn store(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        self.cache
            .lock()
            .map_err(|e| Error::Lock(e.to_string()))?
            .insert(key.clone(), value.clone());
        Ok(())
    }

    fn flight(&self, key: &S::Key) -> Result<Arc<AsyncMutex<()>>> {
        let mut flights = self.flights.lock().map_err(|e| Error::Lock(e.to_string()))?;
        Ok(Arc::clone(flights.entry(key.clone()).or_default()))
    }

    // the cache is filled before the flight is removed, so a later miss
    // either finds the value or starts a fresh flight
    fn land(&self, key: &S::Key, flight: &Arc<AsyncMutex<()>>) -> Result<()> {
        let mut flights = self.flights.lock().map_err(|e| Error::Lock(e.to_string()))?;
        if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            flights.remove(key);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BroadbandKey {
    pub state: String,
    pub county: String,
}

impl BroadbandKey {
    pub fn new(state: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            county: county.into(),
        }
    }
}

impl fmt::Display for BroadbandKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.state, self.county)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Broadband {
    pub percentage: f64,
    pub retrieved_at: DateTime<Utc>,
}

pub struct CensusSource {
    client: reqwest::Client,
    base_url: String,
    // state name -> state code, fetched once
    states: OnceCell<HashMap<String, String>>,
}

impl CensusSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            states: OnceCell::new(),
        })
    }

    async fn rows(&self, path: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "API connection not success status {} for {url}",
                response.status()
            )));
        }
        let body: Vec<Vec<Value>> = response.json().await?;
        // the first row is always the column names
        if body.len() < 2 {
            return Err(Error::Fetch("Malformed response from Census API: No data returned".into()));
        }
        Ok(body
            .into_iter()
            .skip(1)
            .map(|row| row.into_iter().map(text).collect())
            .collect())
    }

    async fn fetch_states(&self) -> Result<HashMap<String, String>> {
        let rows = self.rows("/data/2010/dec/sf1?get=NAME&for=state:*").await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.as_slice() {
                [name, code, ..] => Some((name.clone(), code.clone())),
                _ => None,
            })
            .collect())
    }

    async fn state_code(&self, state: &str) -> Result<String> {
        let states = self.states.get_or_try_init(|| self.fetch_states()).await?;
        states
            .get(state)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("unknown state '{state}'")))
    }

    // county names come back as "Kings County, New York"; either that or
    // the part before the comma is accepted
    async fn county_code(&self, state_code: &str, county: &str) -> Result<String> {
        let path = format!("/data/2010/dec/sf1?get=NAME&for=county:*&in=state:{state_code}");
        self.rows(&path)
            .await?
            .into_iter()
            .find_map(|row| match row.as_slice() {
                [name, _, code, ..] if county_matches(name, county) => Some(code.clone()),
                _ => None,
            })
            .ok_or_else(|| Error::Fetch(format!("unknown county '{county}'")))
    }
}

impl Source for CensusSource {
    type Key = BroadbandKey;
    type Value = Broadband;

    async fn fetch(&self, key: &BroadbandKey) -> Result<Broadband> {
        let state = self.state_code(&key.state).await?;
        let county = self.county_code(&state, &key.county).await?;
        let path = format!(
            "/data/2021/acs/acs1/subject/variables\
             ?get=NAME,S2802_C03_022E&for=county:{county}&in=state:{state}"
        );
        let rows = self.rows(&path).await?;
        let estimate = rows
            .first()
            .and_then(|row| row.get(1))
            .ok_or_else(|| Error::Fetch("Malformed response from Census API: no estimate".into()))?;
        let percentage = estimate
            .parse::<f64>()
            .map_err(|e| Error::Fetch(format!("estimate '{estimate}' is not a number: {e}")))?;
        Ok(Broadband {
            percentage,
            retrieved_at: Utc::now(),
        })
    }
}

fn county_matches(name: &str, county: &str) -> bool {
    name == county || name.split(", ").next() == Some(county)
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
