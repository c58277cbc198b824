use crate::arena::ModuleId;
use crate::bus::{PipeTable, PortLink};

/// Half of a forwarder pair: stands in front of one node and passes that
/// node's writes on to the node in front of its sibling.
///
/// The sibling is a plain handle. Removing either half leaves the other with a
/// stale handle, which it treats as "no sibling".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Forwarder {
    sibling: Option<ModuleId>,
}

impl Forwarder {
    pub fn new(sibling: ModuleId) -> Self {
        Self {
            sibling: Some(sibling),
        }
    }

    /// Half of a pair whose sibling has not been allocated yet.
    pub fn unpaired() -> Self {
        Self { sibling: None }
    }

    pub fn sibling(&self) -> Option<ModuleId> {
        self.sibling
    }

    pub fn pair_with(&mut self, sibling: ModuleId) {
        self.sibling = Some(sibling);
    }

    pub fn detach(&mut self) {
        self.sibling = None;
    }

    /// Phase 1 work. `own` is the link to our node, `onward` the sibling's
    /// link to its node. Acknowledges what our node took from us, then moves
    /// at most one value from our node into the pipe toward the other node.
    /// Returns true when a value moved.
    pub fn relay(own: PortLink, onward: Option<PortLink>, pipes: &mut PipeTable) -> bool {
        pipes.take_delivery(own.send);
        let Some(onward) = onward else {
            return false;
        };
        if !pipes.is_empty(onward.send) {
            return false;
        }
        let Some(value) = pipes.claim(own.receive) else {
            return false;
        };
        pipes.offer(onward.send, value, false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arena::Arena;
    use casing_machine::Pipe;

    struct Pair {
        pipes: PipeTable,
        near: PortLink,
        far: PortLink,
        /// Writer end of the near node.
        node_out: crate::bus::PipeId,
        /// Reader end of the far node.
        node_in: crate::bus::PipeId,
    }

    fn pair() -> Pair {
        let mut arena = Arena::new();
        let node = arena.insert(());
        let other = arena.insert(());
        let near_id = arena.insert(());
        let far_id = arena.insert(());
        let mut pipes = PipeTable::new();
        let node_out = pipes.open(node);
        let near_out = pipes.open(near_id);
        let other_out = pipes.open(other);
        let node_in = pipes.open(far_id);
        Pair {
            near: PortLink {
                send: near_out,
                receive: node_out,
                peer: node,
            },
            far: PortLink {
                send: node_in,
                receive: other_out,
                peer: other,
            },
            pipes,
            node_out,
            node_in,
        }
    }

    #[test]
    fn moves_one_value_toward_the_far_node() {
        let mut pair = pair();
        assert!(pair.pipes.offer(pair.node_out, 12, false));
        assert!(!Forwarder::relay(pair.near, Some(pair.far), &mut pair.pipes));
        pair.pipes.step();

        assert!(Forwarder::relay(pair.near, Some(pair.far), &mut pair.pipes));
        assert!(pair.pipes.is_claimed(pair.node_out));
        pair.pipes.step();
        assert_eq!(pair.pipes.get(pair.node_in).and_then(Pipe::peek), Some(12));
        assert!(pair.pipes.take_delivery(pair.node_out));
    }

    #[test]
    fn waits_while_the_far_pipe_is_busy() {
        let mut pair = pair();
        pair.pipes.offer(pair.node_in, 1, false);
        pair.pipes.offer(pair.node_out, 2, false);
        pair.pipes.step();
        assert!(!Forwarder::relay(pair.near, Some(pair.far), &mut pair.pipes));
        assert_eq!(pair.pipes.get(pair.node_out).and_then(Pipe::peek), Some(2));
    }

    #[test]
    fn detached_half_holds_values_back() {
        let mut pair = pair();
        pair.pipes.offer(pair.node_out, 2, false);
        pair.pipes.step();
        assert!(!Forwarder::relay(pair.near, None, &mut pair.pipes));
        assert_eq!(pair.pipes.get(pair.node_out).and_then(Pipe::peek), Some(2));
    }
}
