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

use crate::{Address, Geolocator, Limits, Network, PeerRecord, PeerSession, WireAddress, WireAddressError};

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{self, Instant},
};

/// How long the whole frontier may run; the scheduler wrapping the crawler
/// applies its own 30-minute guard on top.
pub const CRAWL_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// The budget of a recursively discovered survey, from spawn to completion.
/// Seed surveys are bounded only by the crawl deadline.
pub const SURVEY_TIMEOUT: Duration = Duration::from_secs(120);

/// Consecutive address rounds without growth tolerated before a peer is
/// considered saturated and released.
pub const SATURATION_PATIENCE: u32 = 10;

/// The user agent announced to every peer.
pub const USER_AGENT: &str = "/crawler:0.0.1/";

/// The pace of the engine's progress lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// The outcome of surveying one peer. Whatever the session managed to learn
/// before failing is kept: a half-done handshake still yields an id, and a
/// timed-out exchange still yields the addresses collected so far.
#[derive(Debug)]
pub struct Survey {
    pub address: Address,
    pub id: String,
    pub user_agent: String,
    pub collected: HashSet<WireAddress>,
    pub error: String,
    pub loc: String,
}

impl Survey {
    fn empty(address: Address) -> Self {
        Self {
            address,
            id: String::new(),
            user_agent: String::new(),
            collected: HashSet::new(),
            error: String::new(),
            loc: String::new(),
        }
    }

    fn failed(address: Address, error: &str) -> Self {
        let mut survey = Self::empty(address);
        survey.error = error.into();
        survey
    }
}

/// Expands the crawl graph under bounded parallelism and a hard wall-clock
/// budget. All bookkeeping (`seen`, `bad_hosts`, the result map) is confined
/// to the engine's own loop; surveys only ever report back through their
/// return value.
pub struct Frontier {
    network: Network,
    geolocator: Arc<Geolocator>,
    parallelism: usize,
    crawl_timeout: Duration,
    survey_timeout: Duration,
    patience: u32,
    accept_unroutable: bool,
}

impl Frontier {
    pub fn new(network: Network, geolocator: Arc<Geolocator>, limits: &Limits) -> Self {
        Self {
            network,
            geolocator,
            parallelism: limits.parallelism,
            crawl_timeout: limits.crawl_timeout,
            survey_timeout: limits.survey_timeout,
            patience: limits.patience,
            accept_unroutable: limits.accept_unroutable,
        }
    }

    /// Runs the crawl to its fixpoint or deadline, returning one record per
    /// contacted peer. Surveys cancelled at the deadline install no record.
    pub async fn run(&self, seeds: &[Address]) -> HashMap<Address, PeerRecord> {
        let context = SurveyContext {
            network: self.network,
            geolocator: self.geolocator.clone(),
            semaphore: Arc::new(Semaphore::new(self.parallelism)),
            patience: self.patience,
        };

        let mut surveys: JoinSet<Survey> = JoinSet::new();
        let mut seen: HashSet<Address> = seeds.iter().cloned().collect();
        let mut bad_hosts: HashSet<Vec<u8>> = HashSet::new();
        let mut results: HashMap<Address, PeerRecord> = HashMap::new();

        for seed in seeds {
            surveys.spawn(survey_peer(context.clone(), seed.clone(), None));
        }

        let deadline = Instant::now() + self.crawl_timeout;
        let mut last_progress = Instant::now();

        while !surveys.is_empty() {
            let survey = tokio::select! {
                _ = time::sleep_until(deadline) => {
                    info!("crawl deadline reached with {} surveys in flight", surveys.len());
                    break;
                }
                joined = surveys.join_next() => match joined {
                    None => break,
                    Some(Err(error)) if error.is_cancelled() => continue,
                    Some(Err(error)) => {
                        warn!("a survey task failed: {error}");
                        continue;
                    }
                    Some(Ok(survey)) => survey,
                },
            };

            if last_progress.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!("{} surveys pending, {} peers recorded", surveys.len(), results.len());
                last_progress = Instant::now();
            }

            let mut record = PeerRecord {
                id: survey.id,
                user_agent: survey.user_agent,
                error: survey.error,
                loc: survey.loc,
                neighbors: Vec::new(),
            };

            // Convert and filter the peer's address table, then spawn a
            // survey for every address not yet on the frontier.
            for wire in &survey.collected {
                if bad_hosts.contains(&wire.ip) {
                    continue;
                }
                let neighbor = match Address::from_wire(&wire.ip, wire.port) {
                    Ok(neighbor) => neighbor,
                    Err(error @ WireAddressError::BadIp(_)) => {
                        warn!("{} advertised a bad address: {error}", survey.address);
                        bad_hosts.insert(wire.ip.clone());
                        continue;
                    }
                    Err(error) => {
                        debug!("{} advertised a bad address: {error}", survey.address);
                        continue;
                    }
                };
                if !self.accept_unroutable && !neighbor.is_routable() {
                    debug!("got unroutable address {neighbor}");
                    continue;
                }
                record.neighbors.push(neighbor.clone());
                if seen.insert(neighbor.clone()) {
                    surveys.spawn(survey_peer(context.clone(), neighbor, Some(self.survey_timeout)));
                }
            }

            results.insert(survey.address, record);
        }

        // Cancel stragglers and wait them out.
        surveys.abort_all();
        while surveys.join_next().await.is_some() {}

        results
    }
}

#[derive(Clone)]
struct SurveyContext {
    network: Network,
    geolocator: Arc<Geolocator>,
    semaphore: Arc<Semaphore>,
    patience: u32,
}

async fn survey_peer(context: SurveyContext, address: Address, budget: Option<Duration>) -> Survey {
    match budget {
        None => conduct_survey(context, address).await,
        Some(budget) => {
            let deadline = time::timeout(budget, conduct_survey(context, address.clone())).await;
            deadline.unwrap_or_else(|_| {
                debug!("survey of {address} timed out");
                Survey::failed(address, "timeout")
            })
        }
    }
}

async fn conduct_survey(context: SurveyContext, address: Address) -> Survey {
    // The permit is the parallelism cap: at most this many sessions (and
    // their sockets) exist at once.
    let _permit = match context.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return Survey::failed(address, "cancelled"),
    };

    let mut survey = Survey::empty(address.clone());

    let local_id: [u8; 16] = rand::random();
    let mut session =
        match PeerSession::connect(&address, context.network, local_id.to_vec(), USER_AGENT).await {
            Ok(session) => session,
            Err(error) => {
                debug!("couldn't reach {address}: {error}");
                survey.error = error.to_string();
                return survey;
            }
        };
    survey.id = hex::encode(&session.peer_id);
    survey.user_agent = session.peer_user_agent.clone();

    // Drain the peer's table until it stops growing for `patience` rounds in
    // a row; any growth restores the full allowance.
    let mut previous_size: i64 = -1;
    let mut patience = context.patience;
    let mut last_progress = Instant::now();
    while (survey.collected.len() as i64) > previous_size || patience > 0 {
        if (survey.collected.len() as i64) <= previous_size {
            patience -= 1;
        } else {
            patience = context.patience;
        }
        previous_size = survey.collected.len() as i64;

        if last_progress.elapsed() >= PROGRESS_LOG_INTERVAL {
            info!("still collecting addresses from {address}");
            last_progress = Instant::now();
        }

        match session.request_addresses().await {
            Ok(addresses) => survey.collected.extend(addresses.iter().map(WireAddress::from)),
            Err(error) => {
                debug!("address exchange with {address} broke off: {error}");
                survey.error = error.to_string();
                return survey;
            }
        }
    }

    // A saturated exchange that never produced a single address is still a
    // dead end, and tagged as such.
    if survey.collected.is_empty() {
        survey.error = "no addresses".into();
    }

    survey.loc = context.geolocator.locate(&address).await;
    session.close();

    survey
}
