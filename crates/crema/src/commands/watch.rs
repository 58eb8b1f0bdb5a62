//! `crema watch`: keep the coordinator running and print every change.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crema_core::{MachineConfig, StatusSnapshot, StatusValue, SyncCoordinator};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// How often the loop checks whether the background refresh hit an auth failure.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// One changed property, as printed.
#[derive(Debug, Serialize)]
struct Change {
    at: DateTime<Local>,
    key: String,
    value: StatusValue,
}

/// Fold `watch` flags into the machine config before the coordinator is built.
pub fn apply(args: &WatchArgs, config: &mut MachineConfig) {
    if args.push {
        config.sync.use_push_channel = true;
    }
    if let Some(secs) = args.interval {
        config.sync.poll_interval = Duration::from_secs(secs);
    }
}

pub async fn handle(
    coordinator: &SyncCoordinator,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut stream = coordinator.watch();
    coordinator.start().await?;

    let mut previous = stream.latest();
    print_changes(&StatusSnapshot::default(), &previous, args, global)?;

    if !global.quiet {
        eprintln!(
            "Watching {} ({}), Ctrl-C to stop",
            coordinator.config().display_name(),
            coordinator.state()
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("interrupted");
                return Ok(());
            }
            next = stream.changed() => {
                let Some(current) = next else {
                    return Ok(());
                };
                print_changes(&previous, &current, args, global)?;
                previous = current;
            }
            _ = health_check.tick() => {
                let health = coordinator.health();
                if health.reauth_required {
                    return Err(CliError::AuthFailed {
                        message: health.last_error.unwrap_or_default(),
                    });
                }
            }
        }
    }
}

fn print_changes(
    previous: &StatusSnapshot,
    current: &StatusSnapshot,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let at = Local::now();
    for change in diff(previous, current, &args.key, at) {
        let line = match global.output {
            OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(&change)?,
            OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(&change)?),
            OutputFormat::Plain => format!("{}={}", change.key, output::display_value(&change.value)),
            OutputFormat::Table => format!(
                "{}  {:<24} {}",
                change.at.format("%H:%M:%S"),
                change.key,
                output::display_value(&change.value)
            ),
        };
        output::print_output(&line, global.quiet);
    }
    Ok(())
}

/// Keys whose value differs between two snapshots, restricted to `filter`
/// when it is non-empty.
fn diff(
    previous: &StatusSnapshot,
    current: &StatusSnapshot,
    filter: &[String],
    at: DateTime<Local>,
) -> Vec<Change> {
    let before = previous.to_map();
    let after = current.to_map();
    after
        .iter()
        .filter(|(key, _)| filter.is_empty() || filter.contains(key))
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| Change {
            at,
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crema_core::{MachineModel, StatusMap, StatusStore};

    fn args() -> WatchArgs {
        WatchArgs {
            push: false,
            interval: None,
            key: Vec::new(),
        }
    }

    #[test]
    fn diff_reports_only_changed_keys() {
        let store = StatusStore::new();
        let first = store.merge_full(
            [
                ("power".to_owned(), StatusValue::Int(1)),
                ("coffee_set_temp".to_owned(), StatusValue::Float(93.0)),
            ]
            .into_iter()
            .collect(),
        );
        let second = store.merge_one("power", StatusValue::Int(0)).unwrap();

        let changes = diff(&first, &second, &[], Local::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "power");
        assert_eq!(changes[0].value, StatusValue::Int(0));
    }

    #[test]
    fn diff_respects_key_filter() {
        let store = StatusStore::new();
        let empty = store.read();
        let full = store.merge_full(
            [
                ("power".to_owned(), StatusValue::Int(1)),
                ("coffee_set_temp".to_owned(), StatusValue::Float(93.0)),
            ]
            .into_iter()
            .collect(),
        );
        let changes = diff(&empty, &full, &["coffee_set_temp".into()], Local::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "coffee_set_temp");
    }

    #[test]
    fn brew_active_shows_up_as_a_change() {
        let store = StatusStore::new();
        let before = store.merge_full(StatusMap::new());
        let after = store.merge_one("brew_active", StatusValue::Bool(true)).unwrap();
        let changes = diff(&before, &after, &[], Local::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "brew_active");
    }

    #[test]
    fn flags_fold_into_sync_config() {
        let mut config = MachineConfig::new(
            "http://127.0.0.1:8081".parse().unwrap(),
            "LM000001",
            MachineModel::LineaMini,
        );
        let mut watch = args();
        watch.push = true;
        watch.interval = Some(5);
        apply(&watch, &mut config);
        assert!(config.sync.use_push_channel);
        assert_eq!(config.sync.poll_interval, Duration::from_secs(5));

        let mut untouched = config.clone();
        apply(&args(), &mut untouched);
        assert!(untouched.sync.use_push_channel);
    }
}
