// ── Pipe edit builders ──

use ccpipes_api::{Factory, GroupId, Pipe, PipeEdits, PipeId, RequestBody};

use crate::error::CoreError;

/// A new pipe from `from` to `to`, with a freshly minted ID.
pub fn connect_pipe(from: GroupId, to: GroupId) -> RequestBody {
    RequestBody::PipeAdd {
        pipe: Pipe::new(PipeId::generate(), from, to),
    }
}

/// One `PipeDel` per pipe, in order.
pub fn delete_pipes(ids: &[PipeId]) -> Vec<RequestBody> {
    ids.iter()
        .map(|id| RequestBody::PipeDel {
            pipe_id: id.clone(),
        })
        .collect()
}

/// Move both endpoints of an existing pipe.
pub fn reconnect_pipe(id: PipeId, from: GroupId, to: GroupId) -> RequestBody {
    RequestBody::PipeEdit {
        pipe_id: id,
        edits: PipeEdits {
            from: Some(from),
            to: Some(to),
            ..PipeEdits::default()
        },
    }
}

/// Whether either end of `pipe` is a fluid group.
pub fn is_fluid_pipe(pipe: &Pipe, factory: &Factory) -> bool {
    [&pipe.from, &pipe.to]
        .into_iter()
        .filter_map(|id| factory.group(id))
        .any(ccpipes_api::Group::is_fluid)
}

/// Apply the same edits to several pipes.
///
/// `mode` has no meaning for fluid pipes and is dropped for them. Pipes left
/// with nothing to change get no request.
pub fn edit_pipes(
    ids: &[PipeId],
    edits: &PipeEdits,
    factory: &Factory,
) -> Result<Vec<RequestBody>, CoreError> {
    if edits.is_empty() {
        return Ok(Vec::new());
    }

    let mut requests = Vec::with_capacity(ids.len());
    for id in ids {
        let pipe = factory.pipe(id).ok_or_else(|| CoreError::PipeNotFound {
            identifier: id.to_string(),
        })?;

        let mut pipe_edits = edits.clone();
        if pipe_edits.mode.is_some() && is_fluid_pipe(pipe, factory) {
            tracing::debug!(pipe = %id, "Dropping mode edit for fluid pipe");
            pipe_edits.mode = None;
        }
        if pipe_edits.is_empty() {
            continue;
        }
        requests.push(RequestBody::PipeEdit {
            pipe_id: id.clone(),
            edits: pipe_edits,
        });
    }
    Ok(requests)
}
