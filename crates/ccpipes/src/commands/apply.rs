use ccpipes_core::apply_patches;

use crate::cli::{ApplyArgs, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let factory = util::read_factory(&args.factory)?;

    let mut patches = Vec::new();
    for path in &args.patches {
        patches.extend(util::read_patches(path)?);
    }
    tracing::debug!(patches = patches.len(), "applying patches");

    let patched = apply_patches(&factory, &patches)?;
    let out = output::render_single(
        &global.output,
        &patched,
        |f| {
            format!(
                "Applied {} patch(es): {}",
                patches.len(),
                util::factory_summary(f)
            )
        },
        util::factory_summary,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
