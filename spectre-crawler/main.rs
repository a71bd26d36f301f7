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

use anyhow::Result;
use clap::Parser;
use spectre_crawler_cli::Crawl;

#[tokio::main]
async fn main() -> Result<()> {
    // Read configuration options.
    let crawl = Crawl::parse();

    // Run the crawl and print its summary.
    let summary = crawl.start().await?;
    println!("{summary}");

    Ok(())
}
