// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Cache command - inspect or empty the query-result cache

use colored::Colorize;
use miette::Result;
use std::io::{self, BufRead, Write};
use std::time::{Duration, SystemTime};

use super::CacheAction;
use crate::cache::{Cache, CacheStats, FilesystemCache};
use crate::config::{CacheBackend, Settings};
use crate::utils::{print_header, print_warning};

/// Run the cache command
pub async fn run(action: CacheAction, settings: &Settings) -> Result<()> {
    let cache_settings = &settings.cache;
    if cache_settings.backend == CacheBackend::Memory {
        print_warning("Configured backend is in-memory; showing the filesystem cache directory");
    }

    let cache = FilesystemCache::new(cache_settings.directory())?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;

            print_header("Query cache");
            println!("  Directory: {}", cache.directory().display());
            println!(
                "  Status:    {}",
                if cache_settings.enabled {
                    "enabled".green()
                } else {
                    "disabled".dimmed()
                }
            );
            match cache_settings.ttl_secs {
                Some(ttl) => println!("  TTL:       {}", age(Duration::from_secs(ttl))),
                None => println!("  TTL:       {}", "none".dimmed()),
            }
            println!("  Entries:   {}", stats.entries);
            println!("  Size:      {}", stats.formatted_size());
            print_ages(&stats);

            Ok(())
        }

        CacheAction::Clear { yes } => {
            let stats = cache.stats().await?;
            if stats.entries == 0 {
                println!("{}", "Nothing cached.".dimmed());
                return Ok(());
            }

            let prompt = format!(
                "Remove {} cached result(s), {}?",
                stats.entries,
                stats.formatted_size()
            );
            if !yes && !confirm(&prompt) {
                println!("{}", "Left cache untouched.".dimmed());
                return Ok(());
            }

            cache.clear().await?;
            println!(
                "{} {} cached result(s)",
                "Removed".green(),
                stats.entries
            );
            Ok(())
        }
    }
}

fn print_ages(stats: &CacheStats) {
    let since = |at: Option<SystemTime>| at.and_then(|t| t.elapsed().ok());

    if let Some(oldest) = since(stats.oldest_entry) {
        println!("  Oldest:    {} ago", age(oldest));
    }
    if let Some(newest) = since(stats.newest_entry) {
        println!("  Newest:    {} ago", age(newest));
    }
}

/// Ask a yes/no question on stdin; anything but "y"/"yes" is a no
fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().ok();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Coarse human-readable age, largest whole unit only
fn age(duration: Duration) -> String {
    const UNITS: [(u64, &str); 3] = [(86_400, "d"), (3_600, "h"), (60, "m")];

    let secs = duration.as_secs();
    UNITS
        .iter()
        .find(|(size, _)| secs >= *size)
        .map(|(size, unit)| format!("{}{}", secs / size, unit))
        .unwrap_or_else(|| format!("{}s", secs))
}
