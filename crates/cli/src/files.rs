//! Data-directory files.
//!
//! All text files are line oriented. Pair maps hold one `"<pubkey> <url>"`
//! per line, sorted.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, TimeZone, Utc};
use corelib::key::key_set_from_lines;
use corelib::WriteIndex;
use liveness::LivenessReport;
use tracing::{debug, info, warn};

pub const RELAY_LISTS_FILE: &str = "all_relay_lists.jsonl";
pub const FOLLOWS_FILE: &str = "follows_list.txt";
pub const EXCLUDE_FILE: &str = "outbox_exclude.txt";
pub const FOLLOW_SETS_DIR: &str = "follow_sets";
pub const WRITE_MAP_FILE: &str = "pubkey_relays_map_write.txt";
pub const PAIR_MAP_FILE: &str = "pubkey_relays_map.txt";
pub const ONLINE_MAP_FILE: &str = "pubkey_relays_map_online.txt";
pub const OUTBOX_FILE: &str = "outbox_relays.txt";
pub const MONITOR_REPORT_FILE: &str = "relay_monitor_report.txt";
pub const USER_PUBKEY_FILE: &str = "user_pubkey.txt";
pub const USER_RELAYS_FILE: &str = "user_relay_list.txt";

/// Trimmed, non-empty lines of a text file.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Like [`read_lines`], but a missing file reads as empty.
pub fn read_lines_if_exists(path: &Path) -> anyhow::Result<Vec<String>> {
    match read_lines(path) {
        Ok(lines) => Ok(lines),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "optional file missing");
            Ok(Vec::new())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Writes `lines` newline-terminated, creating parent directories.
pub fn write_lines<I, S>(path: &Path, lines: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = io::BufWriter::new(file);
    for line in lines {
        writeln!(w, "{}", line.as_ref())?;
    }
    w.flush().with_context(|| format!("failed to write {}", path.display()))
}

/// Pair-map lines for an index.
pub fn pair_lines(index: &WriteIndex) -> Vec<String> {
    index
        .pairs()
        .into_iter()
        .map(|(key, url)| format!("{key} {url}"))
        .collect()
}

/// Rebuilds an index from pair-map lines; malformed lines are skipped.
pub fn parse_pair_lines<I, S>(lines: I) -> WriteIndex
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let pairs: Vec<(String, String)> = lines
        .into_iter()
        .filter_map(|line| {
            let mut fields = line.as_ref().split_whitespace();
            let key = fields.next()?;
            let url = fields.collect::<Vec<_>>().join(" ");
            (!url.is_empty()).then(|| (key.to_string(), url))
        })
        .collect();
    WriteIndex::from_pairs(pairs)
}

/// Merges `follow_set_*.txt` files under `dir` into the follows file.
///
/// Returns the number of sets read and keys added. The follows file is only
/// rewritten when at least one set was found.
pub fn merge_follow_sets(dir: &Path, follows: &Path) -> anyhow::Result<(usize, usize)> {
    if !dir.is_dir() {
        return Ok((0, 0));
    }
    let mut merged = key_set_from_lines(read_lines_if_exists(follows)?);

    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("follow_set_") && n.ends_with(".txt"))
        })
        .collect();
    entries.sort();

    let mut sets = 0;
    let mut added = 0;
    for path in entries {
        let lines = match read_lines(&path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read follow set");
                continue;
            }
        };
        sets += 1;
        for key in key_set_from_lines(lines) {
            if merged.insert(key) {
                added += 1;
            }
        }
    }

    if sets > 0 {
        write_lines(follows, merged.iter().map(|k| k.as_str()))?;
        info!(sets, added, "merged follow sets into follows list");
    }
    Ok((sets, added))
}

/// Human-readable liveness report, one relay per line in URL order.
pub fn monitor_report_lines(report: &LivenessReport) -> Vec<String> {
    let mut lines = vec![
        "# Relay Monitor Report".to_string(),
        "# Format: URL | Status | RTT-Open | RTT-Read | RTT-Write | Monitors | Last-Checked".to_string(),
        String::new(),
    ];
    for relay in report.iter() {
        let last_checked = relay
            .last_checked
            .filter(|t| *t > 0)
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!(
            "{} | {} | {}ms | {}ms | {}ms | {} | {}",
            relay.url,
            relay.status,
            relay.rtt_open.unwrap_or(0),
            relay.rtt_read.unwrap_or(0),
            relay.rtt_write.unwrap_or(0),
            relay.monitor_count(),
            last_checked
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::RelayUrl;
    use liveness::{FrequencyTable, FusionConfig, LivenessFusion, MonitorReport};

    #[test]
    fn test_pair_lines_round_trip_through_canonical_form() {
        let index = parse_pair_lines([
            "AA wss://Relay.example/",
            "bb   wss://relay.example",
            "malformed",
            "cc https://web.example",
        ]);
        assert_eq!(pair_lines(&index), ["aa wss://relay.example", "bb wss://relay.example"]);
    }

    #[test]
    fn test_write_and_read_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        write_lines(&path, ["a", "", "  b  "]).unwrap();
        assert_eq!(read_lines(&path).unwrap(), ["a", "b"]);
        assert!(read_lines_if_exists(&dir.path().join("missing.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_merge_follow_sets() {
        let dir = tempfile::tempdir().unwrap();
        let follows = dir.path().join(FOLLOWS_FILE);
        let sets = dir.path().join(FOLLOW_SETS_DIR);
        fs::create_dir_all(&sets).unwrap();
        fs::write(&follows, "BB\naa\n").unwrap();
        fs::write(sets.join("follow_set_1.txt"), "cc\n# note\naa\n").unwrap();
        fs::write(sets.join("ignored.txt"), "zz\n").unwrap();

        assert_eq!(merge_follow_sets(&sets, &follows).unwrap(), (1, 1));
        assert_eq!(read_lines(&follows).unwrap(), ["aa", "bb", "cc"]);
        assert_eq!(merge_follow_sets(&dir.path().join("none"), &follows).unwrap(), (0, 0));
    }

    #[test]
    fn test_monitor_report_lines() {
        let urls = [
            RelayUrl::parse("wss://a.example").unwrap(),
            RelayUrl::parse("wss://b.example").unwrap(),
        ];
        let fusion = LivenessFusion::new(urls.clone(), FusionConfig::default(), FrequencyTable::new(), 1_700_000_000);
        fusion.fold(&MonitorReport {
            monitor: "m".into(),
            target: "wss://a.example/".into(),
            observed_at: 1_700_000_000,
            rtt_open: Some(50),
            rtt_read: Some(70),
            rtt_write: None,
        });
        let lines = monitor_report_lines(&fusion.finish());
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[3], "wss://a.example | online | 50ms | 70ms | 0ms | 1 | 2023-11-14T22:13:20Z");
        assert_eq!(lines[4], "wss://b.example | unknown | 0ms | 0ms | 0ms | 0 | never");
    }
}
