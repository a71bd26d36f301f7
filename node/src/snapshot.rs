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

use crate::{helpers, Address};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    io::Write as _,
    path::Path,
};
use tempfile::NamedTempFile;

/// Snapshots with fewer usable nodes than this are not written, so a failed
/// crawl can't clobber a good one.
pub const MIN_SNAPSHOT_NODES: usize = 10;

/// Everything recorded about one contacted peer. `neighbors` only feeds the
/// frontier expansion and is stripped from the persisted snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The node id echoed during the handshake, as lowercase hex.
    pub id: String,
    /// The user agent the peer announced, e.g. `/spectred:0.3.16/`.
    #[serde(rename = "spectred")]
    pub user_agent: String,
    /// Empty on success, otherwise a diagnostic tag such as `timeout`.
    pub error: String,
    /// `"<lat>,<lon>"`, or empty when geolocation yielded nothing.
    pub loc: String,
    #[serde(skip)]
    pub neighbors: Vec<Address>,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    nodes: &'a BTreeMap<String, PeerRecord>,
    updated_at: i64,
}

/// Serializes the node map (keys sorted, two-space indentation, ASCII-only)
/// and atomically replaces the file at `path`. Consumers either see the
/// previous snapshot or the complete new one, never a partial write.
pub fn write_snapshot(path: &Path, nodes: &BTreeMap<String, PeerRecord>) -> Result<()> {
    let snapshot = Snapshot { nodes, updated_at: helpers::unix_now() };
    let encoded = escape_non_ascii(&serde_json::to_string_pretty(&snapshot)?);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(encoded.as_bytes())?;
    file.persist(path)?;

    Ok(())
}

/// Rewrites every non-ASCII character as a `\uXXXX` escape (surrogate pairs
/// above the BMP). JSON confines non-ASCII to string literals, so a whole-text
/// pass is equivalent to escaping during serialization.
fn escape_non_ascii(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for character in json.chars() {
        if character.is_ascii() {
            escaped.push(character);
        } else {
            let mut units = [0u16; 2];
            for unit in character.encode_utf16(&mut units) {
                let _ = write!(escaped, "\\u{unit:04x}");
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(user_agent: &str) -> PeerRecord {
        PeerRecord {
            id: "ab".repeat(16),
            user_agent: user_agent.into(),
            error: String::new(),
            loc: "48.85,2.35".into(),
            neighbors: vec![Address::parse_seed("203.0.113.5:18111", 18111).unwrap()],
        }
    }

    #[test]
    fn sorts_keys_and_strips_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");

        let mut nodes = BTreeMap::new();
        nodes.insert("9.9.9.9:18111".to_string(), record("/spectred:0.3.16/"));
        nodes.insert("1.1.1.1:18111".to_string(), record("/spectred:0.3.14/"));

        write_snapshot(&path, &nodes).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        // Keys come out sorted and the ephemeral neighbor set is gone.
        assert!(text.find("1.1.1.1:18111").unwrap() < text.find("9.9.9.9:18111").unwrap());
        assert!(!text.contains("neighbors"));

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["nodes"]["1.1.1.1:18111"]["spectred"], "/spectred:0.3.14/");
        assert_eq!(parsed["nodes"]["1.1.1.1:18111"]["loc"], "48.85,2.35");
        assert!(parsed["updated_at"].as_i64().unwrap() > 1_700_000_000);
    }

    #[test]
    fn escapes_non_ascii_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");

        let mut nodes = BTreeMap::new();
        nodes.insert("1.1.1.1:18111".to_string(), record("/spectred:0.3.16/ \u{00e9}\u{1f680}"));

        write_snapshot(&path, &nodes).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(text.is_ascii());
        assert!(text.contains("\\u00e9"));
        assert!(text.contains("\\ud83d\\ude80"));

        // The escapes survive a round trip.
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["nodes"]["1.1.1.1:18111"]["spectred"], "/spectred:0.3.16/ \u{00e9}\u{1f680}");
    }

    #[test]
    fn replaces_an_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");

        let mut nodes = BTreeMap::new();
        nodes.insert("1.1.1.1:18111".to_string(), record("/spectred:0.3.14/"));
        write_snapshot(&path, &nodes).unwrap();

        nodes.insert("2.2.2.2:18111".to_string(), record("/spectred:0.3.16/"));
        write_snapshot(&path, &nodes).unwrap();

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["nodes"].as_object().unwrap().len(), 2);
    }
}
