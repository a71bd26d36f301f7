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

use crate::{
    helpers,
    snapshot::{self, MIN_SNAPSHOT_NODES},
    Address,
    Frontier,
    Geolocator,
    Network,
    PeerRecord,
    CRAWL_TIMEOUT,
    SATURATION_PATIENCE,
    SURVEY_TIMEOUT,
};

use anyhow::Result;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

/// The tunable limits of a crawl. The defaults are the production settings;
/// tests shrink them to keep local runs fast.
#[derive(Clone, Debug)]
pub struct Limits {
    /// The maximum number of concurrently open peer sessions.
    pub parallelism: usize,
    /// The wall-clock budget of the whole frontier.
    pub crawl_timeout: Duration,
    /// The budget of each recursively discovered survey.
    pub survey_timeout: Duration,
    /// Non-growing address rounds tolerated before a peer is released.
    pub patience: u32,
    /// The snapshot is only written when at least this many peers served a
    /// usable address.
    pub min_snapshot_nodes: usize,
    /// Admit private and loopback neighbor addresses; only local test
    /// harnesses want this.
    pub accept_unroutable: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            parallelism: helpers::default_parallelism(),
            crawl_timeout: CRAWL_TIMEOUT,
            survey_timeout: SURVEY_TIMEOUT,
            patience: SATURATION_PATIENCE,
            min_snapshot_nodes: MIN_SNAPSHOT_NODES,
            accept_unroutable: false,
        }
    }
}

/// What a finished crawl amounted to.
#[derive(Clone, Copy, Debug)]
pub struct CrawlSummary {
    /// Peers for which a survey completed (including failed ones).
    pub contacted: usize,
    /// Peers that served at least one usable address.
    pub kept: usize,
    /// Whether the snapshot was (re)written.
    pub written: bool,
}

/// The top-level driver: runs the frontier over the seeds, filters the
/// results, and persists the snapshot when enough of the network answered.
pub struct Crawler {
    seeds: Vec<Address>,
    network: Network,
    output: PathBuf,
    geolocator: Arc<Geolocator>,
    limits: Limits,
}

impl Crawler {
    pub fn new(seeds: Vec<Address>, network: Network, output: PathBuf, geolocator: Geolocator) -> Self {
        Self { seeds, network, output, geolocator: Arc::new(geolocator), limits: Limits::default() }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Runs one complete crawl. Only a failing snapshot write surfaces as an
    /// error; per-peer failures are part of the result.
    pub async fn run(&self) -> Result<CrawlSummary> {
        info!(
            "crawling {} from {} seed(s), running {} surveys concurrently",
            self.network,
            self.seeds.len(),
            self.limits.parallelism
        );

        let frontier = Frontier::new(self.network, self.geolocator.clone(), &self.limits);
        let results = frontier.run(&self.seeds).await;
        let contacted = results.len();

        // Keep only the peers that actually served an address; the rest are
        // dead ends whose records would only age the map.
        let kept: BTreeMap<String, PeerRecord> = results
            .into_iter()
            .filter(|(_, record)| !record.neighbors.is_empty())
            .map(|(address, record)| (address.to_string(), record))
            .collect();

        let written = kept.len() >= self.limits.min_snapshot_nodes;
        if written {
            snapshot::write_snapshot(&self.output, &kept)?;
            info!("wrote {} nodes to {}", kept.len(), self.output.display());
        } else {
            info!(
                "skipping the snapshot write: only {} of the required {} nodes have usable neighbors",
                kept.len(),
                self.limits.min_snapshot_nodes
            );
        }

        Ok(CrawlSummary { contacted, kept: kept.len(), written })
    }
}
