// Copyright (C) 2024-2025 The spectre-crawler authors.
// This file is part of the spectre-crawler library.

// The spectre-crawler library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The spectre-crawler library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the spectre-crawler library. If not, see <https://www.gnu.org/licenses/>.

use crate::Address;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::{num::NonZeroUsize, time::Duration};
use tokio::time;

/// The lookup endpoint; overridable so tests can point at a local server.
const GEO_ENDPOINT: &str = "https://api.ipgeolocation.io/ipgeo";

/// Hosts remembered per run, negative results included.
const GEO_CACHE_SIZE: usize = 8192;

/// Attempts per lookup before the host is given up on.
const GEO_ATTEMPTS: u32 = 2;

/// The pause between attempts.
const GEO_BACKOFF: Duration = Duration::from_secs(2);

/// Best-effort IP-to-coordinates lookups against ipgeolocation.io, memoized
/// per host. A lookup can only ever produce an empty location, never an
/// error: geolocation is advisory and must not fail a peer.
pub struct Geolocator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    start_host: Option<String>,
    cache: Mutex<LruCache<String, String>>,
}

impl Geolocator {
    /// Creates a geolocator. Lookups require an API key; `start_host` is the
    /// operator's own seed, exempted to avoid wasting quota on it.
    pub fn new(api_key: Option<String>, start_host: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: GEO_ENDPOINT.into(),
            api_key,
            start_host,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(GEO_CACHE_SIZE).expect("nonzero cache size"))),
        }
    }

    /// Points the geolocator at a different endpoint (for tests).
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Returns `"<lat>,<lon>"` for the address's host, or `""` when the
    /// location is unknown. The empty sentinel is cached too, so a host that
    /// yielded nothing isn't retried for the rest of the run.
    pub async fn locate(&self, address: &Address) -> String {
        let host = address.geo_host();

        if self.start_host.as_deref() == Some(host) {
            info!("skipping geolocation for start address {host}");
            return String::new();
        }

        if let Some(cached) = self.cache.lock().get(host) {
            return cached.clone();
        }

        let location = self.fetch(host).await;
        self.cache.lock().put(host.to_owned(), location.clone());
        location
    }

    async fn fetch(&self, host: &str) -> String {
        let Some(api_key) = &self.api_key else {
            debug!("no geolocation API key configured, skipping lookup for {host}");
            return String::new();
        };

        let url = format!(
            "{}?apiKey={}&ip={}&fields=country_name,city,latitude,longitude",
            self.endpoint, api_key, host
        );

        let mut retries = GEO_ATTEMPTS;
        while retries > 0 {
            debug!("requesting geolocation for {host} (retries left: {retries})");
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => match response.json::<Value>().await {
                    Ok(body) => match (coordinate(&body["latitude"]), coordinate(&body["longitude"])) {
                        (Some(latitude), Some(longitude)) => {
                            let location = format!("{latitude},{longitude}");
                            info!("geolocation for {host} found: {location}");
                            return location;
                        }
                        _ => {
                            warn!("geolocation response is missing coordinates for {host}: {body}");
                            return String::new();
                        }
                    },
                    Err(error) => {
                        warn!("error reading geolocation data for {host} (retries left: {retries}): {error}");
                        retries -= 1;
                        time::sleep(GEO_BACKOFF).await;
                    }
                },
                Ok(response) => {
                    warn!("geolocation request for {host} failed with status {}", response.status());
                    retries -= 1;
                    time::sleep(GEO_BACKOFF).await;
                }
                Err(error) => {
                    warn!("error reading geolocation data for {host} (retries left: {retries}): {error}");
                    retries -= 1;
                    time::sleep(GEO_BACKOFF).await;
                }
            }
        }

        warn!("failed to retrieve geolocation for {host} after multiple attempts, skipping");
        String::new()
    }
}

/// The API historically returns coordinates as either numbers or numeric
/// strings; accept both.
fn coordinate(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(string) if string.parse::<f64>().is_ok() => Some(string.clone()),
        _ => None,
    }
}
