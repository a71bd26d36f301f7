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

use std::{fmt, str::FromStr};

/// The Spectre network a crawl targets; the name is announced during the
/// handshake and peers on a different network reject the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    /// Returns the network id as announced on the wire.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Mainnet => "spectre-mainnet",
            Self::Testnet => "spectre-testnet",
            Self::Devnet => "spectre-devnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        match id {
            "spectre-mainnet" => Ok(Self::Mainnet),
            "spectre-testnet" => Ok(Self::Testnet),
            "spectre-devnet" => Ok(Self::Devnet),
            other => Err(format!("unknown network '{other}' [options: spectre-mainnet, spectre-testnet, spectre-devnet]")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_ids_round_trip() {
        for network in [Network::Mainnet, Network::Testnet, Network::Devnet] {
            assert_eq!(network.id().parse::<Network>().unwrap(), network);
        }
        assert!("spectre".parse::<Network>().is_err());
    }
}
