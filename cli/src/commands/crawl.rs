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

use crate::helpers::initialize_logger;
use spectre_crawler_node::{Address, Crawler, Geolocator, Network, DEFAULT_PORT};

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

/// Lists all reachable p2p nodes and their information, used to build a map
/// of the network.
#[derive(Clone, Debug, Parser)]
#[clap(name = "spectre-crawler", author, version)]
pub struct Crawl {
    /// Specify the seed address to start crawling from, as host[:port].
    #[clap(long = "addr", env = "SEED_NODE", default_value = "n-mainnet.spectre.ws:18111")]
    pub addr: String,

    /// Specify the network to crawl [options: spectre-mainnet, spectre-testnet, spectre-devnet].
    #[clap(long = "network", default_value = "spectre-mainnet")]
    pub network: Network,

    /// Specify the output path of the JSON snapshot.
    #[clap(long = "output", default_value = "data/nodes.json")]
    pub output: PathBuf,

    /// Specify the API key for ipgeolocation.io; without one, peer locations stay empty.
    #[clap(long = "api_key", env = "IPGEOLOCATION_API_KEY")]
    pub api_key: Option<String>,

    /// Specify the verbosity of the logs [options: 0, 1, 2].
    #[clap(short = 'v', long = "verbose", env = "VERBOSE", default_value_t = 1)]
    pub verbose: u8,
}

impl Crawl {
    /// Runs a single crawl against the configured network. Returns the
    /// summary line to print; only an unusable seed or output path (or a
    /// failing snapshot write) surfaces as an error.
    pub async fn start(self) -> Result<String> {
        initialize_logger(self.verbose);

        let seed = Address::parse_seed(&self.addr, DEFAULT_PORT)
            .with_context(|| format!("invalid seed address '{}'", self.addr))?;
        ensure_writable(&self.output)?;

        let geolocator = Geolocator::new(self.api_key.clone(), Some(seed.geo_host().to_owned()));
        let crawler = Crawler::new(vec![seed], self.network, self.output.clone(), geolocator);
        let summary = crawler.run().await?;

        Ok(match summary.written {
            true => format!(
                "Contacted {} peers; wrote {} nodes to {}",
                summary.contacted,
                summary.kept,
                self.output.display()
            ),
            false => format!(
                "Contacted {} peers; kept the previous snapshot ({} usable nodes is below the write threshold)",
                summary.contacted, summary.kept
            ),
        })
    }
}

/// Fails fast when the snapshot path can't be written, so a long crawl never
/// ends in a lost result.
fn ensure_writable(path: &Path) -> Result<()> {
    if path.exists() {
        OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("cannot write to {}", path.display()))?;
        return Ok(());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        bail!("cannot write to {}: directory {} does not exist", path.display(), dir.display());
    }
    // A probe file in the target directory; removed on drop.
    tempfile::NamedTempFile::new_in(dir).with_context(|| format!("cannot write to {}", path.display()))?;

    Ok(())
}
