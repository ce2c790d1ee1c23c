use serde::Serialize;
use tabled::Tabled;

use ccpipes_api::{Group, MachineId};
use ccpipes_core::store::group_parents;

use crate::cli::{GlobalOpts, GroupsArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct GroupView<'a> {
    #[serde(flatten)]
    group: &'a Group,
    machine: Option<&'a MachineId>,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Machine")]
    machine: String,
    #[tabled(rename = "Fluid")]
    fluid: String,
    #[tabled(rename = "Slots")]
    slots: usize,
}

pub fn handle(args: &GroupsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let factory = util::read_factory(&args.factory)?;
    let parents = group_parents(&factory);

    if let Some(ref machine) = args.machine {
        if factory.machine(&MachineId::from(machine.as_str())).is_none() {
            return Err(CliError::NotFound {
                resource_type: "machine".into(),
                identifier: machine.clone(),
            });
        }
    }

    let views: Vec<GroupView<'_>> = factory
        .groups
        .values()
        .map(|group| GroupView {
            group,
            machine: parents.get(&group.id),
        })
        .filter(|view| {
            args.machine
                .as_deref()
                .is_none_or(|m| view.machine.is_some_and(|owner| owner.as_str() == m))
        })
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &views,
        |v| GroupRow {
            id: v.group.id.to_string(),
            name: v.group.name().unwrap_or("-").to_owned(),
            machine: v.machine.map_or_else(|| "-".into(), ToString::to_string),
            fluid: output::flag(v.group.is_fluid(), color),
            slots: v.group.slots.len(),
        },
        |v| v.group.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
