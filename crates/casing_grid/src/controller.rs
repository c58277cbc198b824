use casing_machine::{DebugView, ParseError, Port};
use heapless::String;
use thiserror_no_std::Error;
use tracing::{debug, trace, warn};

use crate::arena::{Arena, ModuleId};
use crate::bus::{link_at, NodeBus, PipeTable, PortLink, Ports};
use crate::config::{ConfigError, Settings};
use crate::forwarder::Forwarder;
use crate::{Node, COLUMNS_CAPACITY};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("no module {0}")]
    UnknownModule(ModuleId),
    #[error("module {0} is not an execution node")]
    NotExecutionNode(ModuleId),
    #[error("module {0} is not a forwarder")]
    NotForwarder(ModuleId),
    #[error("port {} of module {module} is already linked", .port.name())]
    PortInUse { module: ModuleId, port: Port },
    #[error("port {} of module {module} is not linked", .port.name())]
    PortUnlinked { module: ModuleId, port: Port },
    #[error("controller already drives {0} nodes")]
    TooManyNodes(usize),
    #[error("{0}")]
    Compile(#[from] ParseError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// `step` does nothing. Node state is kept.
    Stopped,
    Running,
}

#[derive(Debug)]
enum ModuleKind {
    Node(Box<Node>),
    Forwarder(Forwarder),
}

#[derive(Debug)]
struct Module {
    ports: Ports,
    kind: ModuleKind,
}

impl Module {
    fn new(kind: ModuleKind) -> Self {
        Self {
            ports: [None; 4],
            kind,
        }
    }

    fn first_link(&self) -> Option<PortLink> {
        self.ports.iter().flatten().next().copied()
    }
}

/// Drives a set of modules in lock step.
///
/// Each tick runs in two phases. Phase 1 steps every module once, in slot
/// order. Phase 2 commits every pipe. A value offered in phase 1 can only be
/// claimed in the next tick's phase 1, so the order of phase 1 never changes
/// what a node observes. The one exception is several readers racing for a
/// single `ANY` write in the same tick: the module stepped first wins.
#[derive(Debug)]
pub struct Controller {
    settings: Settings,
    modules: Arena<Module>,
    pipes: PipeTable,
    state: ControllerState,
    ticks: u64,
}

impl Controller {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            modules: Arena::new(),
            pipes: PipeTable::new(),
            state: ControllerState::Stopped,
            ticks: 0,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Ticks run since the controller was created.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn start(&mut self) {
        if self.state != ControllerState::Running {
            debug!(tick = self.ticks, "controller started");
        }
        self.state = ControllerState::Running;
    }

    pub fn stop(&mut self) {
        if self.state != ControllerState::Stopped {
            debug!(tick = self.ticks, "controller stopped");
        }
        self.state = ControllerState::Stopped;
    }

    /// Add an enabled execution node with an empty program.
    pub fn add_node(&mut self) -> Result<ModuleId, GridError> {
        let limit = self.settings.max_nodes_per_controller;
        if self.node_count() >= limit {
            warn!(limit, "node limit reached");
            return Err(GridError::TooManyNodes(limit));
        }
        let mut node = Box::new(Node::new());
        node.set_enabled(true);
        let id = self.modules.insert(Module::new(ModuleKind::Node(node)));
        debug!(module = %id, "node added");
        Ok(id)
    }

    /// Remove a node, its links and any forwarder pair in front of it.
    pub fn remove_node(&mut self, id: ModuleId) -> Result<(), GridError> {
        node(&self.modules, id)?;
        for port in Port::ALL {
            self.unlink_port(id, port);
        }
        self.modules.remove(id);
        debug!(module = %id, "node removed");
        Ok(())
    }

    /// Link `port_a` of `a` directly to `port_b` of `b`.
    pub fn link(
        &mut self,
        a: ModuleId,
        port_a: Port,
        b: ModuleId,
        port_b: Port,
    ) -> Result<(), GridError> {
        self.check_free(a, port_a, b, port_b)?;
        self.connect(a, port_a, b, port_b);
        debug!(a = %a, port_a = port_a.name(), b = %b, port_b = port_b.name(), "linked");
        Ok(())
    }

    /// Undo a `link` or `join` made on `port` of `id`.
    pub fn unlink(&mut self, id: ModuleId, port: Port) -> Result<(), GridError> {
        let module = self.modules.get(id).ok_or(GridError::UnknownModule(id))?;
        if link_at(&module.ports, port).is_none() {
            return Err(GridError::PortUnlinked { module: id, port });
        }
        self.unlink_port(id, port);
        debug!(module = %id, port = port.name(), "unlinked");
        Ok(())
    }

    /// Put a forwarder pair between `port_a` of `a` and `port_b` of `b`.
    /// Returns the halves in front of `a` and `b`.
    pub fn join(
        &mut self,
        a: ModuleId,
        port_a: Port,
        b: ModuleId,
        port_b: Port,
    ) -> Result<(ModuleId, ModuleId), GridError> {
        self.check_free(a, port_a, b, port_b)?;
        let near = self
            .modules
            .insert(Module::new(ModuleKind::Forwarder(Forwarder::unpaired())));
        let far = self
            .modules
            .insert(Module::new(ModuleKind::Forwarder(Forwarder::new(near))));
        if let Some(Module {
            kind: ModuleKind::Forwarder(forwarder),
            ..
        }) = self.modules.get_mut(near)
        {
            forwarder.pair_with(far);
        }
        self.connect(a, port_a, near, port_a.opposite());
        self.connect(b, port_b, far, port_b.opposite());
        debug!(a = %a, b = %b, near = %near, far = %far, "forwarder pair inserted");
        Ok((near, far))
    }

    /// Tear down the forwarder pair `id` belongs to.
    pub fn split(&mut self, id: ModuleId) -> Result<(), GridError> {
        forwarder(&self.modules, id)?;
        self.split_pair(id);
        Ok(())
    }

    /// Compile `source` into node `id`. The node's unclaimed writes are
    /// dropped either way.
    pub fn compile<'s, I>(&mut self, id: ModuleId, source: I) -> Result<(), GridError>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let limits = self.settings.limits();
        let Self { modules, pipes, .. } = self;
        let ports = modules.get(id).ok_or(GridError::UnknownModule(id))?.ports;
        let node = node_mut(modules, id)?;
        reset_outgoing(&ports, pipes);
        match node.compile(source, &limits) {
            Ok(()) => {
                debug!(
                    module = %id,
                    instructions = node.state().instructions().len(),
                    "compiled"
                );
                Ok(())
            }
            Err(err) => {
                debug!(module = %id, line = err.line, error = %err.kind, "compile failed");
                Err(err.into())
            }
        }
    }

    pub fn set_enabled(&mut self, id: ModuleId, enabled: bool) -> Result<(), GridError> {
        node_mut(&mut self.modules, id)?.set_enabled(enabled);
        debug!(module = %id, enabled, "node enabled state changed");
        Ok(())
    }

    /// Clear the registers of node `id` and restart it at the first
    /// instruction. The program stays.
    pub fn reset_node(&mut self, id: ModuleId) -> Result<(), GridError> {
        let Self { modules, pipes, .. } = self;
        let ports = modules.get(id).ok_or(GridError::UnknownModule(id))?.ports;
        let node = node_mut(modules, id)?;
        reset_outgoing(&ports, pipes);
        node.reset();
        debug!(module = %id, "node reset");
        Ok(())
    }

    /// Run one tick. Does nothing while stopped.
    pub fn step(&mut self) {
        if self.state == ControllerState::Stopped {
            return;
        }
        let Self { modules, pipes, .. } = self;
        for id in modules.ids() {
            step_module(modules, pipes, id);
        }
        pipes.step();
        self.ticks = self.ticks.saturating_add(1);
        trace!(tick = self.ticks, "tick");
    }

    pub fn node(&self, id: ModuleId) -> Result<&Node, GridError> {
        node(&self.modules, id)
    }

    pub fn debug_view(&self, id: ModuleId) -> Result<DebugView, GridError> {
        Ok(self.node(id)?.debug_view())
    }

    /// Normalized source text of node `id`, kept even if it failed to compile.
    pub fn source(&self, id: ModuleId) -> Result<&[String<COLUMNS_CAPACITY>], GridError> {
        Ok(self.node(id)?.state().code())
    }

    pub fn node_ids(&self) -> Vec<ModuleId> {
        self.modules
            .iter()
            .filter(|(_, module)| matches!(module.kind, ModuleKind::Node(_)))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|(_, module)| matches!(module.kind, ModuleKind::Node(_)))
            .count()
    }

    /// Nodes and forwarders.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.open_count()
    }

    /// Module on the other end of `port` of `id`.
    pub fn peer(&self, id: ModuleId, port: Port) -> Option<ModuleId> {
        let module = self.modules.get(id)?;
        link_at(&module.ports, port).map(|link| link.peer)
    }

    pub fn sibling(&self, id: ModuleId) -> Result<Option<ModuleId>, GridError> {
        Ok(forwarder(&self.modules, id)?.sibling())
    }

    fn check_free(
        &self,
        a: ModuleId,
        port_a: Port,
        b: ModuleId,
        port_b: Port,
    ) -> Result<(), GridError> {
        for (id, port) in [(a, port_a), (b, port_b)] {
            let module = self.modules.get(id).ok_or(GridError::UnknownModule(id))?;
            if !matches!(module.kind, ModuleKind::Node(_)) {
                return Err(GridError::NotExecutionNode(id));
            }
            if link_at(&module.ports, port).is_some() {
                return Err(GridError::PortInUse { module: id, port });
            }
        }
        if a == b && port_a == port_b {
            return Err(GridError::PortInUse {
                module: a,
                port: port_a,
            });
        }
        Ok(())
    }

    fn connect(&mut self, a: ModuleId, port_a: Port, b: ModuleId, port_b: Port) {
        let a_to_b = self.pipes.open(a);
        let b_to_a = self.pipes.open(b);
        self.set_link(
            a,
            port_a,
            PortLink {
                send: a_to_b,
                receive: b_to_a,
                peer: b,
            },
        );
        self.set_link(
            b,
            port_b,
            PortLink {
                send: b_to_a,
                receive: a_to_b,
                peer: a,
            },
        );
    }

    fn set_link(&mut self, id: ModuleId, port: Port, link: PortLink) {
        if let Some(slot) = self
            .modules
            .get_mut(id)
            .and_then(|module| module.ports.get_mut(port.index()))
        {
            *slot = Some(link);
        }
    }

    /// Drop whatever hangs off `port`. A forwarder there takes its sibling
    /// with it.
    fn unlink_port(&mut self, id: ModuleId, port: Port) {
        let Some(link) = self
            .modules
            .get(id)
            .and_then(|module| link_at(&module.ports, port))
        else {
            return;
        };
        if forwarder(&self.modules, link.peer).is_ok() {
            self.split_pair(link.peer);
        } else {
            self.detach_port(id, port);
        }
    }

    fn split_pair(&mut self, id: ModuleId) {
        let sibling = forwarder(&self.modules, id)
            .ok()
            .and_then(|forwarder| forwarder.sibling());
        self.remove_forwarder(id);
        if let Some(sibling) = sibling {
            if forwarder(&self.modules, sibling).is_ok() {
                self.remove_forwarder(sibling);
            }
        }
        debug!(forwarder = %id, "forwarder pair removed");
    }

    fn remove_forwarder(&mut self, id: ModuleId) {
        for port in Port::ALL {
            self.detach_port(id, port);
        }
        self.modules.remove(id);
    }

    /// Close the link on `port` of `id` and clear the peer's end.
    fn detach_port(&mut self, id: ModuleId, port: Port) -> Option<PortLink> {
        let link = self
            .modules
            .get_mut(id)?
            .ports
            .get_mut(port.index())?
            .take()?;
        self.pipes.close(link.send);
        self.pipes.close(link.receive);
        if let Some(peer) = self.modules.get_mut(link.peer) {
            for slot in peer.ports.iter_mut() {
                if slot.is_some_and(|other| other.send == link.receive) {
                    *slot = None;
                }
            }
        }
        Some(link)
    }
}

fn node(modules: &Arena<Module>, id: ModuleId) -> Result<&Node, GridError> {
    match modules.get(id) {
        Some(Module {
            kind: ModuleKind::Node(node),
            ..
        }) => Ok(node),
        Some(_) => Err(GridError::NotExecutionNode(id)),
        None => Err(GridError::UnknownModule(id)),
    }
}

fn node_mut(modules: &mut Arena<Module>, id: ModuleId) -> Result<&mut Node, GridError> {
    match modules.get_mut(id) {
        Some(Module {
            kind: ModuleKind::Node(node),
            ..
        }) => Ok(node),
        Some(_) => Err(GridError::NotExecutionNode(id)),
        None => Err(GridError::UnknownModule(id)),
    }
}

fn forwarder(modules: &Arena<Module>, id: ModuleId) -> Result<&Forwarder, GridError> {
    match modules.get(id) {
        Some(Module {
            kind: ModuleKind::Forwarder(forwarder),
            ..
        }) => Ok(forwarder),
        Some(_) => Err(GridError::NotForwarder(id)),
        None => Err(GridError::UnknownModule(id)),
    }
}

fn reset_outgoing(ports: &Ports, pipes: &mut PipeTable) {
    for link in ports.iter().flatten() {
        pipes.reset(link.send);
    }
}

/// Phase 1 work of one module.
fn step_module(modules: &mut Arena<Module>, pipes: &mut PipeTable, id: ModuleId) {
    let Some(module) = modules.get(id) else {
        return;
    };
    let ports = module.ports;
    let half = match &module.kind {
        ModuleKind::Node(_) => None,
        ModuleKind::Forwarder(forwarder) => Some(*forwarder),
    };

    let Some(half) = half else {
        if let Ok(node) = node_mut(modules, id) {
            node.step(&mut NodeBus::new(ports, pipes));
        }
        return;
    };

    let Some(own) = ports.iter().flatten().next().copied() else {
        return;
    };
    let onward = half.sibling().and_then(|sibling| {
        forwarder(modules, sibling).ok()?;
        modules.get(sibling).and_then(Module::first_link)
    });
    if half.sibling().is_some() && onward.is_none() {
        if let Some(Module {
            kind: ModuleKind::Forwarder(forwarder),
            ..
        }) = modules.get_mut(id)
        {
            forwarder.detach();
            debug!(forwarder = %id, "sibling gone, detached");
        }
    }
    Forwarder::relay(own, onward, pipes);
}
