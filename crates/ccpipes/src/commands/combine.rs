//! Offline merge planning: prints the request a live editor would send.

use tabled::Tabled;

use ccpipes_api::{GroupId, MachineId, Request, RequestBody};
use ccpipes_core::{combine_groups, combine_machines};

use crate::cli::{CombineArgs, CombineCommand, GlobalOpts, OutputFormat};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Request")]
    kind: String,
    #[tabled(rename = "Target")]
    target: String,
}

fn target_of(body: &RequestBody) -> String {
    match body {
        RequestBody::GroupEdit { group_id, .. } | RequestBody::GroupDel { group_id } => {
            group_id.to_string()
        }
        RequestBody::MachineEdit { machine_id, .. } | RequestBody::MachineDel { machine_id } => {
            machine_id.to_string()
        }
        _ => String::new(),
    }
}

pub fn handle(args: CombineArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bodies = match args.command {
        CombineCommand::Machines(target) => {
            let factory = util::read_factory(&target.factory)?;
            let sources: Vec<MachineId> = target.sources.into_iter().map(MachineId::from).collect();
            combine_machines(&sources, &MachineId::from(target.into), &factory)?
        }
        CombineCommand::Groups(target) => {
            let factory = util::read_factory(&target.factory)?;
            let sources: Vec<GroupId> = target.sources.into_iter().map(GroupId::from).collect();
            combine_groups(&sources, &GroupId::from(target.into), &factory)?
        }
    };

    let steps: Vec<StepRow> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| StepRow {
            step: i + 1,
            kind: body.message_type().to_string(),
            target: target_of(body),
        })
        .collect();

    let out = match (Request::bundle(bodies), &global.output) {
        (None, OutputFormat::Table | OutputFormat::Plain) => "Nothing to merge".to_owned(),
        (None, format) => output::render_single(
            format,
            &serde_json::json!({ "requests": [] }),
            |_| String::new(),
            |_| String::new(),
        )?,
        (Some(_), OutputFormat::Table) => output::render_table(&steps),
        (Some(_), OutputFormat::Plain) => steps
            .iter()
            .map(|s| format!("{} {}", s.kind, s.target))
            .collect::<Vec<_>>()
            .join("\n"),
        (Some(request), format) => output::render_single(
            format,
            &request,
            |_| String::new(),
            |r| r.req_id.to_string(),
        )?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
