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

use std::time::{SystemTime, UNIX_EPOCH};

/// The number of file descriptors left to the process outside of peer sessions.
#[cfg(not(windows))]
const RESERVED_FDS: u64 = 20;

/// The session cap used when the descriptor limit cannot be determined.
const FALLBACK_PARALLELISM: usize = 100;

/// Returns the number of seconds since the unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs() as i64).unwrap_or_default()
}

/// Returns the maximum number of concurrently open peer sessions. Each session
/// holds at least one socket, so the cap is derived from the soft descriptor
/// limit, minus a reserve for the process itself.
#[cfg(not(windows))]
pub fn default_parallelism() -> usize {
    use tokio::sync::Semaphore;

    match rlimit::getrlimit(rlimit::Resource::NOFILE) {
        Ok((soft, _)) => soft.saturating_sub(RESERVED_FDS).clamp(1, Semaphore::MAX_PERMITS as u64) as usize,
        Err(error) => {
            warn!("couldn't read the file descriptor limit ({error}); falling back to {FALLBACK_PARALLELISM} sessions");
            FALLBACK_PARALLELISM
        }
    }
}

/// Returns the maximum number of concurrently open peer sessions; Windows has
/// no descriptor limit to consult, so a fixed cap is used.
#[cfg(windows)]
pub fn default_parallelism() -> usize {
    FALLBACK_PARALLELISM
}
