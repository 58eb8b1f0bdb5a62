//! `crema sensors`: binary sensors derived from the status.

use serde::Serialize;
use tabled::Tabled;

use crema_core::{BinarySensor, StatusSnapshot, SyncCoordinator};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SensorState {
    name: String,
    label: &'static str,
    available: bool,
    on: Option<bool>,
}

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Sensor")]
    name: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "State")]
    state: String,
}

pub async fn handle(coordinator: &SyncCoordinator, global: &GlobalOpts) -> Result<(), CliError> {
    super::initialize(coordinator, global).await?;
    let snapshot = coordinator.read();
    let sensors = collect(coordinator.config().sync.use_push_channel, &snapshot);

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &sensors,
        |s| SensorRow {
            name: s.name.clone(),
            label: s.label.into(),
            state: if s.available {
                output::on_off(s.on, color)
            } else {
                "unavailable".into()
            },
        },
        |s| format!("{}={}", s.name, output::on_off(s.on, false)),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn collect(use_push_channel: bool, snapshot: &StatusSnapshot) -> Vec<SensorState> {
    BinarySensor::available_for(use_push_channel)
        .into_iter()
        .map(|sensor| SensorState {
            name: sensor.to_string(),
            label: sensor.label(),
            available: sensor.is_available(snapshot),
            on: sensor.is_on(snapshot),
        })
        .collect()
}
