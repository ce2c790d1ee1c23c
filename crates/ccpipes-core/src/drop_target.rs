// ── Drop-target resolution ──
//
// While a node is dragged, the renderer reports which nodes it overlaps and
// where the pointer is. The resolver picks the closest compatible node as
// the merge target and, when the drag ends, turns that into merge requests.

use std::mem;

use ccpipes_api::{Factory, GroupId, MachineId, Point, RequestBody};

use crate::combine::combine_machines;
use crate::error::CoreError;

/// A node on the editor canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Machine(MachineId),
    Group(GroupId),
}

impl NodeRef {
    /// Whether `self` can be dropped onto `target` to merge.
    ///
    /// Only machine-onto-machine merges are wired to drag gestures.
    pub fn accepts_drop_onto(&self, target: &NodeRef) -> bool {
        matches!((self, target), (Self::Machine(a), Self::Machine(b)) if a != b)
    }
}

/// An overlapping node reported by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct DropCandidate {
    pub node: NodeRef,
    /// Absolute graph-space position. Nodes not laid out yet have none.
    pub position: Option<Point>,
}

impl DropCandidate {
    pub fn new(node: NodeRef, position: Option<Point>) -> Self {
        Self { node, position }
    }
}

/// Where a drag gesture currently stands.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        node: NodeRef,
    },
    Resolved {
        node: NodeRef,
        target: Option<DropCandidate>,
    },
}

/// Pan and zoom of the canvas, for mapping pointer events to graph space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn screen_to_graph(&self, screen: Point) -> Point {
        // A non-positive zoom would be a renderer bug; treat it as unzoomed.
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Point::new((screen.x - self.x) / zoom, (screen.y - self.y) / zoom)
    }
}

/// Pick the compatible candidate closest to `pointer`.
///
/// Candidates without a position are skipped. On a distance tie the first
/// candidate wins.
pub fn select_drop_target<'a>(
    dragged: &NodeRef,
    pointer: Point,
    candidates: &'a [DropCandidate],
) -> Option<&'a DropCandidate> {
    let mut closest: Option<(&DropCandidate, f64)> = None;
    for candidate in candidates {
        if !dragged.accepts_drop_onto(&candidate.node) {
            continue;
        }
        let Some(position) = candidate.position else {
            continue;
        };
        let distance = position.distance_to(pointer);
        if closest.is_none_or(|(_, best)| distance < best) {
            closest = Some((candidate, distance));
        }
    }
    closest.map(|(candidate, _)| candidate)
}

/// State machine for a single drag gesture at a time.
#[derive(Debug, Default)]
pub struct DropTargetResolver {
    state: DragState,
}

impl DropTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Begin dragging `node`, discarding any earlier gesture.
    pub fn drag_start(&mut self, node: NodeRef) {
        self.state = DragState::Dragging { node };
    }

    /// Re-resolve the target for a pointer at graph-space `pointer` over
    /// `overlapping` nodes. Ignored when no drag is in progress.
    pub fn pointer_moved(
        &mut self,
        pointer: Point,
        overlapping: &[DropCandidate],
    ) -> Option<&DropCandidate> {
        let node = match mem::take(&mut self.state) {
            DragState::Idle => return None,
            DragState::Dragging { node } | DragState::Resolved { node, .. } => node,
        };
        let target = select_drop_target(&node, pointer, overlapping).cloned();
        self.state = DragState::Resolved { node, target };
        self.resolved_target()
    }

    pub fn resolved_target(&self) -> Option<&DropCandidate> {
        match &self.state {
            DragState::Resolved { target, .. } => target.as_ref(),
            _ => None,
        }
    }

    /// Finish the gesture. Always returns to `Idle`; if a target was resolved
    /// the merge requests are built against `factory`.
    pub fn drag_stop(&mut self, factory: &Factory) -> Result<Vec<RequestBody>, CoreError> {
        match mem::take(&mut self.state) {
            DragState::Resolved {
                node: NodeRef::Machine(source),
                target:
                    Some(DropCandidate {
                        node: NodeRef::Machine(target),
                        ..
                    }),
            } => {
                tracing::debug!(source = %source, target = %target, "Dropping machine onto machine");
                combine_machines(&[source], &target, factory)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Abandon the gesture without producing requests.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ccpipes_api::Machine;
    use pretty_assertions::assert_eq;

    fn machine(id: &str) -> NodeRef {
        NodeRef::Machine(id.into())
    }

    fn at(node: NodeRef, x: f64, y: f64) -> DropCandidate {
        DropCandidate::new(node, Some(Point::new(x, y)))
    }

    fn factory() -> Factory {
        Factory::default()
            .with_machine(Machine::new("a", Vec::new()))
            .with_machine(Machine::new("b", Vec::new()))
            .with_machine(Machine::new("c", Vec::new()))
    }

    #[test]
    fn picks_nearest_candidate() {
        let candidates = [at(machine("b"), 5.0, 0.0), at(machine("c"), 0.0, 3.0)];
        let target = select_drop_target(&machine("a"), Point::default(), &candidates);
        assert_eq!(target.map(|c| &c.node), Some(&machine("c")));
    }

    #[test]
    fn ties_go_to_first_encountered() {
        let candidates = [at(machine("b"), 3.0, 4.0), at(machine("c"), -5.0, 0.0)];
        let target = select_drop_target(&machine("a"), Point::default(), &candidates);
        assert_eq!(target.map(|c| &c.node), Some(&machine("b")));
    }

    #[test]
    fn incompatible_or_unplaced_candidates_are_ignored() {
        let candidates = [
            at(NodeRef::Group("g1".into()), 0.0, 0.0),
            at(machine("a"), 0.0, 0.0),
            DropCandidate::new(machine("b"), None),
        ];
        assert_eq!(select_drop_target(&machine("a"), Point::default(), &candidates), None);
        // Groups are never dragged onto anything.
        let machines = [at(machine("b"), 1.0, 1.0)];
        assert_eq!(
            select_drop_target(&NodeRef::Group("g1".into()), Point::default(), &machines),
            None
        );
    }

    #[test]
    fn pointer_moves_are_ignored_when_idle() {
        let mut resolver = DropTargetResolver::new();
        assert_eq!(resolver.pointer_moved(Point::default(), &[at(machine("b"), 0.0, 0.0)]), None);
        assert_eq!(resolver.state(), &DragState::Idle);
    }

    #[test]
    fn drop_onto_machine_combines_and_resets() {
        let mut resolver = DropTargetResolver::new();
        resolver.drag_start(machine("a"));
        resolver.pointer_moved(Point::new(10.0, 10.0), &[at(machine("b"), 12.0, 10.0)]);
        assert_eq!(resolver.resolved_target().map(|c| &c.node), Some(&machine("b")));

        let requests = resolver.drag_stop(&factory()).unwrap();
        assert_eq!(resolver.state(), &DragState::Idle);
        assert_eq!(
            requests.last(),
            Some(&RequestBody::MachineDel { machine_id: "a".into() })
        );
        assert!(matches!(
            requests.first(),
            Some(RequestBody::MachineEdit { machine_id, .. }) if machine_id.as_str() == "b"
        ));
    }

    #[test]
    fn target_is_re_resolved_and_can_be_lost() {
        let mut resolver = DropTargetResolver::new();
        resolver.drag_start(machine("a"));
        resolver.pointer_moved(Point::default(), &[at(machine("b"), 1.0, 0.0)]);
        resolver.pointer_moved(Point::default(), &[]);
        assert_eq!(resolver.resolved_target(), None);
        assert_eq!(resolver.drag_stop(&factory()).unwrap(), Vec::new());
    }

    #[test]
    fn drag_stop_resets_even_when_merge_fails() {
        let mut resolver = DropTargetResolver::new();
        resolver.drag_start(machine("a"));
        resolver.pointer_moved(Point::default(), &[at(machine("gone"), 0.0, 0.0)]);

        assert!(resolver.drag_stop(&factory()).is_err());
        assert_eq!(resolver.state(), &DragState::Idle);
    }

    #[test]
    fn cancel_discards_target() {
        let mut resolver = DropTargetResolver::new();
        resolver.drag_start(machine("a"));
        resolver.pointer_moved(Point::default(), &[at(machine("b"), 0.0, 0.0)]);
        resolver.cancel();
        assert_eq!(resolver.drag_stop(&factory()).unwrap(), Vec::new());
    }

    #[test]
    fn new_drag_discards_stale_resolution() {
        let mut resolver = DropTargetResolver::new();
        resolver.drag_start(machine("a"));
        resolver.pointer_moved(Point::default(), &[at(machine("b"), 0.0, 0.0)]);
        resolver.drag_start(machine("c"));
        assert_eq!(resolver.resolved_target(), None);
        assert_eq!(resolver.state(), &DragState::Dragging { node: machine("c") });
    }

    #[test]
    fn viewport_maps_screen_to_graph() {
        let viewport = Viewport { x: 100.0, y: 50.0, zoom: 2.0 };
        assert_eq!(viewport.screen_to_graph(Point::new(300.0, 150.0)), Point::new(100.0, 50.0));
        assert_eq!(Viewport::default().screen_to_graph(Point::new(3.0, 4.0)), Point::new(3.0, 4.0));
    }
}
