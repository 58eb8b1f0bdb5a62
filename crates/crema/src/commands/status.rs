//! `crema status`: one pull, one table.

use serde::Serialize;
use tabled::Tabled;

use crema_core::{StatusMap, StatusSnapshot, StatusValue, SyncCoordinator};

use crate::cli::{GlobalOpts, OutputFormat, StatusArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
pub(crate) struct PropertyRow {
    #[tabled(rename = "Property")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Serialized form of one property, for list output.
#[derive(Serialize)]
pub(crate) struct Property {
    pub key: String,
    pub value: StatusValue,
}

pub async fn handle(
    coordinator: &SyncCoordinator,
    args: &StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    super::initialize(coordinator, global).await?;
    let snapshot = coordinator.read();

    let selected = select(&snapshot, &args.key)?;
    let out = render(&selected, global)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Restrict the snapshot to `keys`, or everything when none are given.
pub(crate) fn select(snapshot: &StatusSnapshot, keys: &[String]) -> Result<StatusMap, CliError> {
    if keys.is_empty() {
        return Ok(snapshot.to_map());
    }
    keys.iter()
        .map(|key| {
            snapshot
                .get(key)
                .map(|value| (key.clone(), value))
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "property".into(),
                    identifier: key.clone(),
                    list_command: "status".into(),
                })
        })
        .collect()
}

pub(crate) fn render(map: &StatusMap, global: &GlobalOpts) -> Result<String, CliError> {
    let items: Vec<Property> = map
        .iter()
        .map(|(key, value)| Property {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();

    match global.output {
        // Structured formats serialize the mapping itself, not the row list.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => output::render_single(
            &global.output,
            map,
            |_| String::new(),
            |_| String::new(),
        ),
        _ => output::render_list(
            &global.output,
            &items,
            |p| PropertyRow {
                key: p.key.clone(),
                value: output::display_value(&p.value),
            },
            |p| format!("{}={}", p.key, output::display_value(&p.value)),
        ),
    }
}
