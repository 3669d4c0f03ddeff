// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Tick Kernel
//!
//! The [`Kernel`] owns every piece of mutable simulation state: the physics backend,
//! the body registry, the anchor graph, the agents, the message board, and the
//! profile. It is driven one [`Kernel::tick`] at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use mrsim_core::error::ConfigurationError;
use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::{BodyHandle, LinkKind, PhysicsBackend};
use mrsim_core::spatial::SpatialIndex;
use mrsim_core::{Configuration, Stopwatch};

use crate::action::{Action, ActionOutcome, BoxedAction, ErasedAction, SolverRegistry};
use crate::agent::{ActionFilter, Agent, AgentId, EmbodiedAgent};
use crate::anchor::{AnchorGraph, AnchorId, LinkId};
use crate::body::{self, Body, BodyId, BodyKind};
use crate::error::{ActionError, AssemblyError, GraphError};
use crate::message::{MessageBoard, NfcMessage};
use crate::profile::Profile;
use crate::snapshot::{AgentSnapshot, Snapshot};
use crate::solvers;

struct AgentEntry {
    id: AgentId,
    agent: Box<dyn Agent>,
    outcomes: Vec<ActionOutcome>,
}

/// The simulation kernel.
pub struct Kernel {
    configuration: Configuration,
    backend: Box<dyn PhysicsBackend>,
    solvers: Arc<SolverRegistry>,
    bodies: BTreeMap<BodyId, Body>,
    next_body: u64,
    graph: AnchorGraph,
    agents: Vec<AgentEntry>,
    next_agent: u64,
    agent_bodies: BTreeMap<AgentId, Vec<BodyId>>,
    filters: HashMap<AgentId, ActionFilter>,
    messages: MessageBoard,
    outcomes: Vec<ActionOutcome>,
    profile: Profile,
    started: Stopwatch,
    time: f64,
    depth: usize,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("time", &self.time)
            .field("bodies", &self.bodies.len())
            .field("agents", &self.agents.len())
            .field("links", &self.graph.link_count())
            .field("solvers", &self.solvers.len())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Kernel`] with the built-in solvers and, optionally, overrides.
pub struct KernelBuilder {
    backend: Box<dyn PhysicsBackend>,
    configuration: Configuration,
    solvers: SolverRegistry,
}

impl KernelBuilder {
    /// Starts from the default configuration and the built-in solvers.
    pub fn new(backend: Box<dyn PhysicsBackend>) -> Self {
        let mut solvers = SolverRegistry::new();
        solvers::register_builtin_solvers(&mut solvers);
        Self {
            backend,
            configuration: Configuration::default(),
            solvers,
        }
    }

    /// Sets the kernel constants.
    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Registers the solver for actions of type `A`, replacing any built-in one.
    #[must_use]
    pub fn with_solver<A, F>(mut self, solver: F) -> Self
    where
        A: Action,
        F: Fn(&mut Kernel, Option<AgentId>, &A) -> Result<A::Outcome, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.solvers.register::<A, F>(solver);
        self
    }

    /// Validates the configuration and builds the kernel.
    pub fn build(self) -> Result<Kernel, ConfigurationError> {
        self.configuration.validate()?;
        let cell = self.configuration.nfc_distance_range;
        log::info!(
            "Kernel: built with {} solvers, {} NFC channels",
            self.solvers.len(),
            self.configuration.nfc_channels
        );
        Ok(Kernel {
            time: self.backend.time(),
            configuration: self.configuration,
            backend: self.backend,
            solvers: Arc::new(self.solvers),
            bodies: BTreeMap::new(),
            next_body: 0,
            graph: AnchorGraph::new(),
            agents: Vec::new(),
            next_agent: 0,
            agent_bodies: BTreeMap::new(),
            filters: HashMap::new(),
            messages: MessageBoard::new(cell),
            outcomes: Vec::new(),
            profile: Profile::default(),
            started: Stopwatch::new(),
            depth: 0,
        })
    }
}

impl Kernel {
    /// Builds a kernel with the built-in solvers.
    pub fn new(
        backend: Box<dyn PhysicsBackend>,
        configuration: Configuration,
    ) -> Result<Self, ConfigurationError> {
        KernelBuilder::new(backend).configuration(configuration).build()
    }

    /// Starts building a kernel.
    pub fn builder(backend: Box<dyn PhysicsBackend>) -> KernelBuilder {
        KernelBuilder::new(backend)
    }

    /// The kernel constants.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Simulation time after the last integration step.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The profile accumulated so far.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The physics backend.
    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    /// The anchor graph.
    pub fn graph(&self) -> &AnchorGraph {
        &self.graph
    }

    /// The solver registry.
    pub fn solvers(&self) -> &SolverRegistry {
        &self.solvers
    }

    /// Looks up a body.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// Every body, by increasing identifier.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Bodies assembled by an embodied agent.
    pub fn agent_bodies(&self, agent: AgentId) -> Option<&[BodyId]> {
        self.agent_bodies.get(&agent).map(Vec::as_slice)
    }

    /// Identifiers of every agent, in polling order.
    pub fn agents(&self) -> Vec<AgentId> {
        self.agents.iter().map(|entry| entry.id).collect()
    }

    /// The NFC message board.
    pub fn messages(&self) -> &MessageBoard {
        &self.messages
    }

    /// Outcomes recorded since the current tick started.
    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    /// Adds a disembodied agent, polled from the next tick on.
    pub fn add_agent(&mut self, agent: Box<dyn Agent>) -> AgentId {
        let id = self.allocate_agent();
        log::debug!("Kernel: added {id}");
        self.agents.push(AgentEntry {
            id,
            agent,
            outcomes: Vec::new(),
        });
        id
    }

    /// Assembles and adds an embodied agent.
    ///
    /// If assembly fails, every body created during it is removed and the agent is
    /// not added.
    pub fn add_embodied_agent<A>(&mut self, mut agent: A) -> Result<AgentId, AssemblyError>
    where
        A: EmbodiedAgent + 'static,
    {
        let id = self.allocate_agent();
        let first_body = self.next_body;
        if let Err(err) = agent.assemble(self, id) {
            let created: Vec<BodyId> = self
                .bodies
                .range(BodyId(first_body)..)
                .map(|(id, _)| *id)
                .collect();
            for body in created {
                if let Err(cleanup) = self.destroy_body(body) {
                    log::warn!("Kernel: failed to remove body {body} of {id}: {cleanup}");
                }
            }
            log::warn!("Kernel: assembly of {id} failed: {err}");
            return Err(err);
        }

        let bodies = agent.bodies();
        log::info!("Kernel: assembled {id} with {} bodies", bodies.len());
        self.agent_bodies.insert(id, bodies);
        self.agents.push(AgentEntry {
            id,
            agent: Box::new(agent),
            outcomes: Vec::new(),
        });
        Ok(id)
    }

    /// Installs the filter applied to every action of `agent`, replacing any
    /// previous one.
    pub fn set_action_filter(&mut self, agent: AgentId, filter: ActionFilter) {
        self.filters.insert(agent, filter);
    }

    /// Live position of an anchor.
    pub fn anchor_position(&self, anchor: AnchorId) -> Result<Point, ActionError> {
        let anchor = self.graph.anchor(anchor)?;
        let body = self.require_body(anchor.body())?;
        let poly = body.poly(self.backend())?;
        Ok(body::anchor_position(&poly, anchor.site(), body.anchor_inset()))
    }

    /// Performs an action on behalf of `agent` and records its outcome.
    ///
    /// Rejections, faults and panics raised while performing the action are
    /// contained here: they only show as an outcome without a result and in the
    /// profile counters.
    pub fn perform(&mut self, action: BoxedAction, agent: Option<AgentId>) -> ActionOutcome {
        let stopwatch = Stopwatch::new();
        let action = match agent.and_then(|id| self.filters.get(&id)) {
            Some(filter) => filter(action),
            None => action,
        };
        let action: Arc<dyn ErasedAction> = Arc::from(action);
        self.profile.actions += 1;

        let solvers = Arc::clone(&self.solvers);
        self.depth += 1;
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            match solvers.solve(self, agent, &*action) {
                Some(result) => Some(result),
                None => action.perform_self_described(self, agent),
            }
        }));
        self.depth -= 1;

        let name = action.action_name();
        // A failing sub-action fails its parent too, so only top-level actions are counted.
        let top_level = self.depth == 0;
        let result = match attempt {
            Ok(Some(Ok(value))) => Some(value),
            Ok(Some(Err(ActionError::Rejected(reason)))) => {
                log::debug!("Kernel: {name} from {agent:?} rejected: {reason}");
                self.profile.illegal_actions += u64::from(top_level);
                None
            }
            Ok(Some(Err(ActionError::Fault(reason)))) => {
                log::warn!("Kernel: {name} from {agent:?} faulted: {reason}");
                self.profile.illegal_actions += u64::from(top_level);
                None
            }
            Ok(None) => {
                log::debug!("Kernel: {name} from {agent:?} is not supported");
                self.profile.unsupported_actions += u64::from(top_level);
                None
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::warn!("Kernel: {name} from {agent:?} panicked: {reason}");
                self.profile.illegal_actions += u64::from(top_level);
                None
            }
        };

        // Nested actions run inside their parent's measurement.
        if top_level {
            self.profile.action_time += stopwatch.elapsed_secs_f64();
        }
        let outcome = ActionOutcome::new(agent, action, result);
        self.outcomes.push(outcome.clone());
        outcome
    }

    /// Performs a typed action and returns its result.
    pub fn perform_as<A: Action>(
        &mut self,
        action: A,
        agent: Option<AgentId>,
    ) -> Result<A::Outcome, ActionError> {
        let outcome = self.perform(Box::new(action), agent);
        if let Some(result) = outcome.result_as::<A>() {
            return Ok(result.clone());
        }
        let name = outcome.action().action_name();
        Err(ActionError::rejected(format!("{name} produced no result")))
    }

    /// Runs one simulation step.
    pub fn tick(&mut self) -> Snapshot {
        let stopwatch = Stopwatch::new();
        self.outcomes.clear();
        self.messages.begin_tick();

        let mut agents = std::mem::take(&mut self.agents);
        for entry in &mut agents {
            let actions = entry.agent.act(self.time, &entry.outcomes);
            let mut outcomes = Vec::with_capacity(actions.len());
            for action in actions {
                outcomes.push(self.perform(action, Some(entry.id)));
            }
            entry.outcomes = outcomes;
        }
        agents.append(&mut self.agents);
        self.agents = agents;

        let visible = self.messages.rotate();

        let integration = Stopwatch::new();
        self.time = self.backend.integrate();
        self.profile.integration_time += integration.elapsed_secs_f64();

        self.profile.ticks += 1;
        self.profile.tick_time += stopwatch.elapsed_secs_f64();
        self.profile.wall_time = self.started.elapsed_secs_f64();
        log::trace!(
            "Kernel: tick {} done at t={:.4} ({} outcomes, {} messages)",
            self.profile.ticks,
            self.time,
            self.outcomes.len(),
            visible.len()
        );

        self.snapshot(visible)
    }

    fn snapshot(&mut self, messages: Vec<NfcMessage>) -> Snapshot {
        let mut bodies = Vec::with_capacity(self.bodies.len());
        for body in self.bodies.values() {
            match body.snapshot(self.backend.as_ref(), &self.graph) {
                Ok(snapshot) => bodies.push(snapshot),
                Err(err) => log::warn!("Kernel: skipping body {} in snapshot: {err}", body.id()),
            }
        }
        let agents = self
            .agents
            .iter()
            .map(|entry| AgentSnapshot {
                id: entry.id,
                bodies: self.agent_bodies.get(&entry.id).cloned().unwrap_or_default(),
            })
            .collect();
        Snapshot {
            time: self.time,
            bodies,
            agents,
            outcomes: std::mem::take(&mut self.outcomes),
            messages,
            profile: self.profile.clone(),
        }
    }

    fn allocate_agent(&mut self) -> AgentId {
        let id = AgentId(self.next_agent);
        self.next_agent += 1;
        id
    }

    // --- Solver support ---

    pub(crate) fn backend_mut(&mut self) -> &mut dyn PhysicsBackend {
        self.backend.as_mut()
    }

    pub(crate) fn messages_mut(&mut self) -> &mut MessageBoard {
        &mut self.messages
    }

    pub(crate) fn require_body(&self, id: BodyId) -> Result<&Body, ActionError> {
        self.bodies
            .get(&id)
            .ok_or_else(|| GraphError::UnknownBody(id).into())
    }

    pub(crate) fn require_agent_bodies(&self, agent: AgentId) -> Result<Vec<BodyId>, ActionError> {
        self.agent_bodies
            .get(&agent)
            .cloned()
            .ok_or_else(|| ActionError::rejected(format!("{agent} has no body")))
    }

    pub(crate) fn body_poly(&self, id: BodyId) -> Result<Poly, ActionError> {
        Ok(self.require_body(id)?.poly(self.backend())?)
    }

    /// Positions of every anchor of a body, in site order.
    pub(crate) fn anchor_positions(&self, id: BodyId) -> Result<Vec<(AnchorId, Point)>, ActionError> {
        let body = self.require_body(id)?;
        let poly = body.poly(self.backend())?;
        let mut positions = Vec::with_capacity(body.anchors().len());
        for anchor in body.anchors() {
            let site = self.graph.anchor(*anchor)?.site();
            positions.push((
                *anchor,
                body::anchor_position(&poly, site, body.anchor_inset()),
            ));
        }
        Ok(positions)
    }

    pub(crate) fn positions_of(
        &self,
        anchors: &[AnchorId],
    ) -> Result<Vec<(AnchorId, Point)>, ActionError> {
        anchors
            .iter()
            .map(|id| Ok((*id, self.anchor_position(*id)?)))
            .collect()
    }

    /// The single body owning every anchor of `anchors`.
    pub(crate) fn owner_of(&self, anchors: &[AnchorId]) -> Result<BodyId, ActionError> {
        let mut owners = BTreeSet::new();
        for id in anchors {
            owners.insert(self.graph.anchor(*id)?.body());
        }
        match (owners.len(), owners.first()) {
            (1, Some(owner)) => Ok(*owner),
            (n, _) => Err(GraphError::AnchorsSpanBodies(n).into()),
        }
    }

    /// Distance below which two anchors get linked rather than attracted: the
    /// closest the two anchors can get, scaled by the attract-link ratio.
    pub(crate) fn link_threshold(&self, a: AnchorId, b: AnchorId) -> Result<f64, ActionError> {
        let inset_a = self.require_body(self.graph.anchor(a)?.body())?.anchor_inset();
        let inset_b = self.require_body(self.graph.anchor(b)?.body())?.anchor_inset();
        Ok(self.configuration.attract_link_range_ratio * (inset_a + inset_b))
    }

    /// The anchorable body other than `owner` minimizing the summed distance from
    /// `sources` to its polygon, if that sum is within the body-find range. Ties go
    /// to the smallest identifier.
    pub(crate) fn closest_anchorable(
        &self,
        owner: BodyId,
        sources: &[(AnchorId, Point)],
    ) -> Result<Option<BodyId>, ActionError> {
        let points: Vec<Point> = sources.iter().map(|(_, p)| *p).collect();
        let Some(origin) = Point::average(&points) else {
            return Ok(None);
        };
        let find_range = self.configuration.body_find_range;

        let mut index = SpatialIndex::new(find_range);
        let mut max_half_diagonal: f64 = 0.0;
        for body in self.bodies.values() {
            if body.id() == owner || !body.is_anchorable() {
                continue;
            }
            let bbox = body.poly(self.backend())?.bounding_box();
            max_half_diagonal = max_half_diagonal.max(bbox.half_diagonal());
            index.insert(bbox.center(), body.id());
        }
        let spread = points
            .iter()
            .map(|p| p.distance(origin))
            .fold(0.0, f64::max);
        let mut candidates: Vec<BodyId> = index
            .query(origin, find_range + max_half_diagonal + spread)
            .into_iter()
            .copied()
            .collect();
        candidates.sort_unstable();

        let mut best: Option<(f64, BodyId)> = None;
        for id in candidates {
            let poly = self.body_poly(id)?;
            let total: f64 = points.iter().map(|p| poly.distance(*p)).sum();
            if total > find_range {
                continue;
            }
            if best.map_or(true, |(d, _)| total < d) {
                best = Some((total, id));
            }
        }
        Ok(best.map(|(_, id)| id))
    }

    /// Registers a body created in the backend and gives it its anchors.
    pub(crate) fn insert_body(
        &mut self,
        handle: BodyHandle,
        kind: BodyKind,
    ) -> Result<BodyId, ActionError> {
        let shape = match self.backend.poly(handle) {
            Ok(shape) => shape,
            Err(err) => {
                if let Err(cleanup) = self.backend.remove_body(handle) {
                    log::warn!("Kernel: failed to drop unreadable body {handle:?}: {cleanup}");
                }
                return Err(err.into());
            }
        };
        let id = BodyId(self.next_body);
        self.next_body += 1;
        let mut body = Body::new(id, handle, kind, &shape);
        for site in body.kind().anchor_sites(&shape) {
            body.push_anchor(self.graph.add_anchor(id, site));
        }
        log::trace!(
            "Kernel: created {:?} body {id} with {} anchors",
            body.variant(),
            body.anchors().len()
        );
        self.bodies.insert(id, body);
        Ok(id)
    }

    /// Removes a body, its anchors and every link touching them.
    pub(crate) fn destroy_body(&mut self, id: BodyId) -> Result<(), ActionError> {
        let body = self
            .bodies
            .remove(&id)
            .ok_or(GraphError::UnknownBody(id))?;
        for anchor in body.anchors() {
            for link in self.graph.remove_anchor(*anchor)? {
                self.backend.remove_constraint(link.constraint())?;
            }
        }
        for bodies in self.agent_bodies.values_mut() {
            bodies.retain(|b| *b != id);
        }
        self.backend.remove_body(body.handle())?;
        Ok(())
    }

    /// Links two anchors, in the graph and in the backend.
    pub(crate) fn create_link(
        &mut self,
        source: AnchorId,
        destination: AnchorId,
        kind: LinkKind,
    ) -> Result<LinkId, ActionError> {
        self.graph.check_linkable(source, destination)?;
        let at_a = self.anchor_position(source)?;
        let at_b = self.anchor_position(destination)?;
        let a = self.require_body(self.graph.anchor(source)?.body())?.handle();
        let b = self.require_body(self.graph.anchor(destination)?.body())?.handle();
        let constraint = self.backend.add_constraint(a, at_a, b, at_b, kind)?;
        match self.graph.insert_link(source, destination, kind, constraint) {
            Ok(link) => Ok(link),
            Err(err) => {
                self.backend.remove_constraint(constraint)?;
                Err(err.into())
            }
        }
    }

    /// Removes a link, in the graph and in the backend.
    pub(crate) fn remove_link(&mut self, id: LinkId) -> Result<(), ActionError> {
        let link = self.graph.remove_link(id)?;
        self.backend.remove_constraint(link.constraint())?;
        Ok(())
    }

    /// Removes links created by an action that failed before completing.
    /// Links already gone are skipped.
    pub(crate) fn discard_links(&mut self, links: &[LinkId]) {
        for link in links.iter().rev() {
            if let Err(err) = self.remove_link(*link) {
                log::warn!("Kernel: could not discard link {link:?}: {err}");
            }
        }
    }

    /// Removes every link touching an anchor, returning their identifiers.
    pub(crate) fn detach_anchor(&mut self, anchor: AnchorId) -> Result<Vec<LinkId>, ActionError> {
        let removed = self.graph.detach(anchor)?;
        for link in &removed {
            self.backend.remove_constraint(link.constraint())?;
        }
        Ok(removed.iter().map(|link| link.id()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::catalog::{
        AttachClosestAnchors, AttractAndLinkAnchor, AttractAndLinkAnchorable, CreateRigidBody,
        CreateUnmovableBody, SenseAngle,
    };
    use mrsim_core::error::BackendResult;
    use mrsim_core::physics::{
        ConstraintHandle, JointState, RigidBodyDesc, RotationalJointDesc, UnmovableBodyDesc,
        VoxelDesc,
    };

    /// A backend holding static shapes only.
    #[derive(Default)]
    struct StaticBackend {
        time: f64,
        shapes: BTreeMap<BodyHandle, Poly>,
        next: u64,
        /// Constraints accepted before `add_constraint` starts failing.
        constraint_budget: Option<usize>,
    }

    impl StaticBackend {
        fn add(&mut self, poly: Poly) -> BodyHandle {
            let handle = BodyHandle(self.next);
            self.next += 1;
            self.shapes.insert(handle, poly);
            handle
        }

        fn shape(&self, handle: BodyHandle) -> BackendResult<&Poly> {
            self.shapes
                .get(&handle)
                .ok_or(mrsim_core::error::BackendError::UnknownBody(handle))
        }
    }

    impl PhysicsBackend for StaticBackend {
        fn time(&self) -> f64 {
            self.time
        }
        fn integrate(&mut self) -> f64 {
            self.time += 0.5;
            self.time
        }
        fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> BackendResult<BodyHandle> {
            Ok(self.add(desc.poly.clone()))
        }
        fn add_unmovable_body(&mut self, desc: &UnmovableBodyDesc) -> BackendResult<BodyHandle> {
            Ok(self.add(desc.poly.clone()))
        }
        fn add_voxel(&mut self, desc: &VoxelDesc) -> BackendResult<BodyHandle> {
            Ok(self.add(Poly::square(Point::ZERO, desc.side_length)))
        }
        fn add_rotational_joint(&mut self, desc: &RotationalJointDesc) -> BackendResult<BodyHandle> {
            Ok(self.add(Poly::rect(Point::ZERO, desc.length, desc.width)))
        }
        fn remove_body(&mut self, handle: BodyHandle) -> BackendResult<()> {
            self.shapes.remove(&handle);
            Ok(())
        }
        fn poly(&self, handle: BodyHandle) -> BackendResult<Poly> {
            self.shape(handle).cloned()
        }
        fn angle(&self, handle: BodyHandle) -> BackendResult<f64> {
            self.shape(handle).map(|_| 0.0)
        }
        fn linear_velocity(&self, handle: BodyHandle) -> BackendResult<Point> {
            self.shape(handle).map(|_| Point::ZERO)
        }
        fn translate(&mut self, handle: BodyHandle, translation: Point) -> BackendResult<()> {
            let moved = self.shape(handle)?.translated(translation);
            self.shapes.insert(handle, moved);
            Ok(())
        }
        fn rotate(&mut self, _handle: BodyHandle, _angle: f64) -> BackendResult<()> {
            Ok(())
        }
        fn apply_force(&mut self, _: BodyHandle, _: Point, _: Point) -> BackendResult<()> {
            Ok(())
        }
        fn actuate_voxel(&mut self, _: BodyHandle, _: [f64; 4]) -> BackendResult<()> {
            Ok(())
        }
        fn set_joint_target(&mut self, _: BodyHandle, _: f64) -> BackendResult<()> {
            Ok(())
        }
        fn joint_state(&self, _: BodyHandle) -> BackendResult<JointState> {
            Ok(JointState {
                angle: 0.0,
                target_angle: 0.0,
                length: 1.0,
            })
        }
        fn add_constraint(
            &mut self,
            _: BodyHandle,
            _: Point,
            _: BodyHandle,
            _: Point,
            _: LinkKind,
        ) -> BackendResult<ConstraintHandle> {
            if self.constraint_budget == Some(0) {
                return Err(mrsim_core::error::BackendError::InvalidShape(
                    "constraint budget exhausted".to_string(),
                ));
            }
            self.constraint_budget = self.constraint_budget.map(|n| n - 1);
            self.next += 1;
            Ok(ConstraintHandle(self.next))
        }
        fn remove_constraint(&mut self, _: ConstraintHandle) -> BackendResult<()> {
            Ok(())
        }
    }

    fn kernel() -> Kernel {
        Kernel::new(Box::<StaticBackend>::default(), Configuration::default()).unwrap()
    }

    /// A kernel whose backend accepts `budget` constraints, with two overlapping
    /// anchored squares whose anchors coincide.
    fn overlapping_squares(budget: usize) -> (Kernel, BodyId, BodyId) {
        let backend = StaticBackend {
            constraint_budget: Some(budget),
            ..Default::default()
        };
        let mut kernel = Kernel::new(Box::new(backend), Configuration::default()).unwrap();
        let mut square = || {
            kernel
                .perform_as(
                    CreateRigidBody {
                        poly: Poly::square(Point::ZERO, 1.0),
                        mass: 1.0,
                        anchored: true,
                    },
                    None,
                )
                .unwrap()
        };
        let (a, b) = (square(), square());
        (kernel, a, b)
    }

    #[derive(Debug)]
    struct Unknown;

    impl Action for Unknown {
        type Outcome = ();
    }

    #[test]
    fn test_builder_rejects_invalid_configuration() {
        let configuration = Configuration {
            nfc_channels: 0,
            ..Default::default()
        };
        assert!(Kernel::new(Box::<StaticBackend>::default(), configuration).is_err());
    }

    #[test]
    fn test_unsupported_action_is_counted() {
        let mut kernel = kernel();
        let outcome = kernel.perform(Box::new(Unknown), None);
        assert!(!outcome.is_success());
        assert_eq!(kernel.profile().unsupported_actions, 1);
        assert_eq!(kernel.profile().illegal_actions, 0);
        assert_eq!(kernel.profile().actions, 1);
    }

    #[test]
    fn test_rejected_action_is_illegal() {
        let mut kernel = kernel();
        let outcome = kernel.perform(Box::new(SenseAngle { body: BodyId(42) }), None);
        assert!(!outcome.is_success());
        assert_eq!(kernel.profile().illegal_actions, 1);
    }

    #[test]
    fn test_overridden_solver_and_panic_containment() {
        let mut kernel = Kernel::builder(Box::<StaticBackend>::default())
            .with_solver::<Unknown, _>(|_, _, _| panic!("boom"))
            .build()
            .unwrap();
        let outcome = kernel.perform(Box::new(Unknown), None);
        assert!(!outcome.is_success());
        assert_eq!(kernel.profile().illegal_actions, 1);
        assert_eq!(kernel.profile().unsupported_actions, 0);
    }

    #[test]
    fn test_tick_advances_time_and_clears_outcomes() {
        let mut kernel = kernel();
        let body = kernel
            .perform_as(
                CreateUnmovableBody {
                    poly: Poly::rect(Point::ZERO, 4.0, 1.0),
                    anchored: true,
                },
                None,
            )
            .unwrap();
        assert_eq!(kernel.outcomes().len(), 1);
        assert_eq!(kernel.body(body).map(|b| b.anchors().len()), Some(4));

        let snapshot = kernel.tick();
        assert_eq!(snapshot.time, 0.5);
        assert!(snapshot.outcomes.is_empty());
        assert_eq!(snapshot.bodies.len(), 1);
        assert_eq!(snapshot.profile.ticks, 1);
        assert!(kernel.outcomes().is_empty());
    }

    #[test]
    fn test_owner_of_rejects_mixed_anchors() {
        let mut kernel = kernel();
        let mut anchors = Vec::new();
        for x in [0.0, 10.0] {
            let body = kernel
                .perform_as(
                    CreateUnmovableBody {
                        poly: Poly::square(Point::new(x, 0.0), 1.0),
                        anchored: true,
                    },
                    None,
                )
                .unwrap();
            anchors.push(kernel.body(body).unwrap().anchors()[0]);
        }
        assert!(kernel.owner_of(&anchors[..1]).is_ok());
        assert_eq!(
            kernel.owner_of(&anchors),
            Err(ActionError::Rejected(
                GraphError::AnchorsSpanBodies(2).to_string()
            ))
        );
        assert!(kernel.owner_of(&[]).is_err());
    }

    #[test]
    fn test_failed_attach_leaves_no_links() {
        let (mut kernel, a, b) = overlapping_squares(2);
        let outcome = kernel.perform(
            Box::new(AttachClosestAnchors {
                k: 4,
                source: a,
                destination: b,
                kind: LinkKind::Rigid,
            }),
            None,
        );
        assert!(!outcome.is_success());
        assert_eq!(kernel.graph().link_count(), 0);
        assert!(kernel.graph().anchors().all(|anchor| !anchor.is_linked()));
        assert_eq!(kernel.profile().illegal_actions, 1);

        let (mut kernel, a, b) = overlapping_squares(4);
        let links = kernel
            .perform_as(
                AttachClosestAnchors {
                    k: 4,
                    source: a,
                    destination: b,
                    kind: LinkKind::Rigid,
                },
                None,
            )
            .unwrap();
        assert_eq!(links.len(), 4);
        assert_eq!(kernel.graph().link_count(), 4);
    }

    #[test]
    fn test_failed_attract_and_link_undoes_earlier_pairs() {
        let (mut kernel, a, b) = overlapping_squares(2);
        let sources = kernel.body(a).unwrap().anchors().to_vec();
        let before = kernel.profile().clone();
        let outcome = kernel.perform(
            Box::new(AttractAndLinkAnchorable {
                sources,
                destination: b,
                magnitude: 1.0,
                kind: LinkKind::Soft,
            }),
            None,
        );
        assert!(!outcome.is_success());
        assert_eq!(kernel.graph().link_count(), 0);

        // One composite, three attract-and-link and three link creations ran, but
        // only the composite counts as illegal.
        let profile = kernel.profile();
        assert_eq!(profile.actions - before.actions, 7);
        assert_eq!(profile.illegal_actions - before.illegal_actions, 1);
    }

    #[test]
    fn test_nested_rejection_counts_once() {
        let (mut kernel, a, b) = overlapping_squares(0);
        let source = kernel.body(a).unwrap().anchors()[0];
        let destination = kernel.body(b).unwrap().anchors()[0];
        let result = kernel.perform_as(
            AttractAndLinkAnchor {
                source,
                destination,
                magnitude: 1.0,
                kind: LinkKind::Rigid,
            },
            None,
        );
        assert!(matches!(result, Err(ActionError::Rejected(_))));
        assert_eq!(kernel.profile().illegal_actions, 1);
        assert_eq!(kernel.profile().unsupported_actions, 0);
    }
}
