use serde::Serialize;
use tabled::Tabled;

use ccpipes_core::{EntityChanges, FactoryChanges, diff_factories};

use crate::cli::{DiffArgs, GlobalOpts, OutputFormat};
use crate::commands::util;
use crate::error::CliError;
use crate::output::{self, ChangeKind};

#[derive(Debug, Serialize)]
struct Change {
    kind: &'static str,
    id: String,
    change: ChangeKind,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Change")]
    change: String,
}

fn flatten<K: ToString>(kind: &'static str, changes: &EntityChanges<K>, out: &mut Vec<Change>) {
    let groups = [
        (ChangeKind::Added, &changes.added),
        (ChangeKind::Deleted, &changes.deleted),
        (ChangeKind::Modified, &changes.modified),
    ];
    for (change, ids) in groups {
        out.extend(ids.iter().map(|id| Change {
            kind,
            id: id.to_string(),
            change,
        }));
    }
}

fn summarize(changes: &FactoryChanges) -> Vec<Change> {
    let mut out = Vec::with_capacity(
        changes.machines.len()
            + changes.groups.len()
            + changes.pipes.len()
            + changes.missing.len()
            + changes.available.len(),
    );
    flatten("machine", &changes.machines, &mut out);
    flatten("group", &changes.groups, &mut out);
    flatten("pipe", &changes.pipes, &mut out);
    flatten("missing", &changes.missing, &mut out);
    flatten("available", &changes.available, &mut out);
    out
}

pub fn handle(args: &DiffArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let old = util::read_factory(&args.old)?;
    let new = util::read_factory(&args.new)?;

    if args.delta {
        // The raw delta is always JSON; an empty object means no change.
        let delta = diff_factories(&old, &new)?
            .map_or_else(|| serde_json::json!({}), ccpipes_api::Patch::into_value);
        let out = if matches!(global.output, OutputFormat::JsonCompact) {
            serde_json::to_string(&delta)?
        } else {
            serde_json::to_string_pretty(&delta)?
        };
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let changes = summarize(&FactoryChanges::between(&old, &new));
    if changes.is_empty() && matches!(global.output, OutputFormat::Table) {
        output::print_output("No changes", global.quiet);
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &changes,
        |c| ChangeRow {
            kind: c.kind,
            id: c.id.clone(),
            change: c.change.paint(color),
        },
        |c| format!("{} {} {}", c.change.label(), c.kind, c.id),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
