use casing_machine::{Pipe, Port, PortBus, Word};

use crate::arena::ModuleId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PipeId(usize);

#[derive(Debug)]
struct PipeSlot {
    pipe: Pipe,
    writer: ModuleId,
    /// Holds one copy of an `ANY` write.
    shared: bool,
}

/// Every pipe of a controller. Pipes are addressed by `PipeId` and recycled
/// once closed.
#[derive(Debug, Default)]
pub struct PipeTable {
    slots: Vec<Option<PipeSlot>>,
    free: Vec<usize>,
}

impl PipeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pipe written by `writer`.
    pub fn open(&mut self, writer: ModuleId) -> PipeId {
        let slot = PipeSlot {
            pipe: Pipe::new(),
            writer,
            shared: false,
        };
        if let Some(index) = self.free.pop() {
            if let Some(entry) = self.slots.get_mut(index) {
                *entry = Some(slot);
                return PipeId(index);
            }
        }
        self.slots.push(Some(slot));
        PipeId(self.slots.len().saturating_sub(1))
    }

    pub fn close(&mut self, id: PipeId) {
        if let Some(entry) = self.slots.get_mut(id.0) {
            if entry.take().is_some() {
                self.free.push(id.0);
            }
        }
    }

    pub fn get(&self, id: PipeId) -> Option<&Pipe> {
        self.slot(id).map(|slot| &slot.pipe)
    }

    pub fn offer(&mut self, id: PipeId, value: Word, shared: bool) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        if !slot.pipe.offer(value) {
            return false;
        }
        slot.shared = shared;
        true
    }

    /// Claim the value in `id`. Claiming one copy of an `ANY` write withdraws
    /// the writer's other copies in the same tick.
    pub fn claim(&mut self, id: PipeId) -> Option<Word> {
        let slot = self.slot_mut(id)?;
        let value = slot.pipe.try_claim()?;
        if slot.shared {
            let writer = slot.writer;
            for (index, other) in self.slots.iter_mut().enumerate() {
                let Some(other) = other else {
                    continue;
                };
                if index != id.0 && other.shared && other.writer == writer {
                    other.pipe.withdraw();
                }
            }
        }
        Some(value)
    }

    pub fn take_delivery(&mut self, id: PipeId) -> bool {
        self.slot_mut(id).is_some_and(|slot| slot.pipe.take_delivery())
    }

    pub fn withdraw(&mut self, id: PipeId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.pipe.withdraw();
        }
    }

    pub fn reset(&mut self, id: PipeId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.pipe.reset();
        }
    }

    pub fn is_claimed(&self, id: PipeId) -> bool {
        self.get(id).is_some_and(Pipe::is_claimed)
    }

    pub fn is_empty(&self, id: PipeId) -> bool {
        self.get(id).is_some_and(Pipe::is_empty)
    }

    /// Commit phase of a tick.
    pub fn step(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.pipe.step();
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn slot(&self, id: PipeId) -> Option<&PipeSlot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: PipeId) -> Option<&mut PipeSlot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }
}

/// One end of a link as seen from the module owning the port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortLink {
    pub send: PipeId,
    pub receive: PipeId,
    pub peer: ModuleId,
}

/// Port slots of a module, indexed by `Port::index`.
pub type Ports = [Option<PortLink>; 4];

pub fn link_at(ports: &Ports, port: Port) -> Option<PortLink> {
    ports.get(port.index()).copied().flatten()
}

/// `PortBus` for one execution node during phase 1 of a tick.
pub struct NodeBus<'a> {
    ports: Ports,
    pipes: &'a mut PipeTable,
}

impl<'a> NodeBus<'a> {
    pub fn new(ports: Ports, pipes: &'a mut PipeTable) -> Self {
        Self { ports, pipes }
    }

    fn links(&self) -> impl Iterator<Item = (Port, PortLink)> + '_ {
        Port::ALL
            .into_iter()
            .filter_map(|port| link_at(&self.ports, port).map(|link| (port, link)))
    }
}

impl PortBus for NodeBus<'_> {
    fn offer(&mut self, port: Port, value: Word) -> bool {
        match link_at(&self.ports, port) {
            Some(link) => self.pipes.offer(link.send, value, false),
            None => false,
        }
    }

    fn offer_any(&mut self, value: Word) -> bool {
        let links: Vec<PortLink> = self.links().map(|(_, link)| link).collect();
        if links.iter().any(|link| self.pipes.is_claimed(link.send)) {
            return false;
        }
        let mut offered = false;
        for link in links {
            offered |= self.pipes.offer(link.send, value, true);
        }
        offered
    }

    fn try_claim(&mut self, port: Port) -> Option<Word> {
        let link = link_at(&self.ports, port)?;
        self.pipes.claim(link.receive)
    }

    fn poll_delivered(&mut self) -> Option<Port> {
        let links: Vec<(Port, PortLink)> = self.links().collect();
        let (port, _) = links
            .iter()
            .find(|(_, link)| self.pipes.take_delivery(link.send))?;
        for (_, link) in links.iter() {
            self.pipes.withdraw(link.send);
        }
        Some(*port)
    }
}
