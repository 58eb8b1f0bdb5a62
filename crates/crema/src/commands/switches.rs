//! `crema switches`: list machine switches and toggle them.

use std::str::FromStr;

use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;

use crema_core::{MachineModel, MachineSwitch, StatusMap, StatusSnapshot, SyncCoordinator, Toggleable};

use crate::cli::{GlobalOpts, SwitchesArgs, SwitchesCommand};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SwitchState {
    name: &'static str,
    label: &'static str,
    property: &'static str,
    on: Option<bool>,
    attributes: StatusMap,
}

#[derive(Tabled)]
struct SwitchRow {
    #[tabled(rename = "Switch")]
    name: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Attributes")]
    attributes: String,
}

pub async fn handle(
    coordinator: &SyncCoordinator,
    args: SwitchesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SwitchesCommand::List => {
            super::initialize(coordinator, global).await?;
            let snapshot = coordinator.read();
            let states = collect(coordinator.config().model, &snapshot);

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &states,
                |s| SwitchRow {
                    name: s.name.into(),
                    label: s.label.into(),
                    state: output::on_off(s.on, color),
                    attributes: s
                        .attributes
                        .iter()
                        .map(|(k, v)| format!("{k}={}", output::display_value(v)))
                        .collect::<Vec<_>>()
                        .join("\n"),
                },
                |s| format!("{}={}", s.name, output::on_off(s.on, false)),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        SwitchesCommand::On { name } => set(coordinator, &name, true, global).await,
        SwitchesCommand::Off { name } => set(coordinator, &name, false, global).await,
    }
}

async fn set(
    coordinator: &SyncCoordinator,
    name: &str,
    on: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let switch = parse_switch(name)?;
    super::initialize(coordinator, global).await?;
    coordinator.set_switch(switch, on).await?;

    if !global.quiet {
        let color = output::should_color(&global.color);
        eprintln!(
            "✓ {} on {} is now {}",
            switch.label(),
            coordinator.config().display_name(),
            output::on_off(Some(on), color)
        );
    }
    Ok(())
}

fn parse_switch(name: &str) -> Result<MachineSwitch, CliError> {
    MachineSwitch::from_str(name.trim()).map_err(|_| CliError::NotFound {
        resource_type: "switch".into(),
        identifier: name.into(),
        list_command: "switches list".into(),
    })
}

/// State of every switch `model` offers.
fn collect(model: MachineModel, snapshot: &StatusSnapshot) -> Vec<SwitchState> {
    MachineSwitch::iter()
        .filter(|switch| switch.supports(model))
        .map(|switch| SwitchState {
            name: switch.key(),
            label: switch.label(),
            property: switch.property(),
            on: switch.read(snapshot),
            attributes: switch.attributes(model, snapshot),
        })
        .collect()
}
