use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use habit_core::{snapshot::StoreSnapshot, HabitService};
use tracing::{debug, info};

use crate::config::AppConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: usize,
    pub failures: usize,
}

/// Restores the service from the configured state file when it exists,
/// otherwise seeds it according to the config.
pub fn build_service(config: &AppConfig) -> Result<HabitService> {
    let mut builder = HabitService::builder();
    match config.state_path.as_deref().filter(|path| path.exists()) {
        Some(path) => {
            let snapshot = StoreSnapshot::load(path)
                .with_context(|| format!("failed to load state from {}", path.display()))?;
            info!(
                path = %path.display(),
                stacks = snapshot.stacks.len(),
                "restoring state"
            );
            builder = builder.with_snapshot(snapshot);
        }
        None => {
            if config.seed_defaults {
                builder = builder.with_default_catalog();
            }
            if config.seed_sample_stacks {
                builder = builder.with_sample_stacks();
            }
        }
    }
    builder
        .build()
        .context("failed to initialize habit service")
}

/// Answers one JSON response line per non-blank request line until `input`
/// is exhausted.
pub fn serve<R: BufRead, W: Write>(
    service: &HabitService,
    input: R,
    mut output: W,
) -> Result<ServeStats> {
    let started = Instant::now();
    let mut stats = ServeStats::default();
    for line in input.lines() {
        let line = line.context("failed to read request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = habit_bridge::handle_line(service, line);
        stats.requests += 1;
        if !response.ok {
            stats.failures += 1;
        }
        serde_json::to_writer(&mut output, &response).context("failed to write response")?;
        output.write_all(b"\n").context("failed to write response")?;
        output.flush().context("failed to flush response")?;
        debug!(ok = response.ok, "response written");
    }
    info!(
        requests = stats.requests,
        failures = stats.failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "input closed"
    );
    Ok(stats)
}

pub fn run(config: AppConfig) -> Result<()> {
    let service = build_service(&config)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(&service, stdin.lock(), stdout.lock())?;
    if let Some(path) = &config.state_path {
        service
            .save_snapshot(path)
            .with_context(|| format!("failed to save state to {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn responses(output: Vec<u8>) -> Vec<Value> {
        String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json response"))
            .collect()
    }

    #[test]
    fn serves_one_response_per_request_line() {
        let service = build_service(&AppConfig::default()).expect("service");
        let input = concat!(
            "{\"op\":\"ping\"}\n",
            "\n",
            "garbage\n",
            "{\"op\":\"create_stack\",\"name\":\"Quick\",\"habitIds\":[\"2\"]}\n",
            "{\"op\":\"list_progress\"}\n",
        );
        let mut output = Vec::new();
        let stats = serve(&service, Cursor::new(input), &mut output).expect("serve");
        assert_eq!(
            stats,
            ServeStats {
                requests: 4,
                failures: 1
            }
        );

        let responses = responses(output);
        assert_eq!(responses.len(), 4);
        assert_eq!(responses[1]["error"]["kind"], "bad_request");
        assert_eq!(responses[2]["data"]["name"], "Quick");
        assert_eq!(responses[3]["data"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn state_file_survives_a_restart() {
        let dir = tempdir().expect("tempdir");
        let config = AppConfig {
            state_path: Some(dir.path().join("habits.json")),
            ..AppConfig::default()
        };

        let first = build_service(&config).expect("fresh service");
        let stack = first
            .create_stack(habit_core::stack::NewStack {
                name: "Night".into(),
                habit_ids: vec!["18".into()],
            })
            .expect("stack");
        first.toggle_habit(&stack.id, "18").expect("toggle");
        first
            .save_snapshot(config.state_path.as_ref().expect("path"))
            .expect("save");

        let second = build_service(&AppConfig {
            seed_defaults: false,
            ..config
        })
        .expect("restored service");
        assert_eq!(second.list_habits().len(), 24);
        assert_eq!(second.get_progress(&stack.id).unwrap().current_streak, 1);
    }

    #[test]
    fn without_defaults_the_catalog_is_empty() {
        let config = AppConfig {
            seed_defaults: false,
            ..AppConfig::default()
        };
        let service = build_service(&config).expect("service");
        assert!(service.list_habits().is_empty());
        assert!(service.list_categories().is_empty());
    }
}
