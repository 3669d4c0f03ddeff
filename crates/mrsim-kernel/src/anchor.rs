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

//! # Anchor/Link Constraint Graph
//!
//! Anchors are attachment points on bodies; links join two anchors of different
//! bodies and are materialised in the physics backend as constraints.
//!
//! Anchors and links live in generational arenas: identifiers stay valid until the
//! element is removed, and a stale identifier never aliases a newer element. A link
//! is stored once and referenced from both of its anchors, so inserting it registers
//! the reversed link on the destination and removing it drops both directions at once.

use mrsim_core::math::Point;
use mrsim_core::physics::{ConstraintHandle, LinkKind};
use serde::{Deserialize, Serialize};

use crate::body::{AnchorSite, BodyId};
use crate::error::GraphError;

/// Identifier of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId {
    index: u32,
    generation: u32,
}

/// Identifier of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next: Option<u32> },
}

/// Slot storage with an intrusive free list.
#[derive(Debug, Clone)]
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free_list: None,
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    /// Stores the value built by `make(index, generation)`.
    fn insert_with(&mut self, make: impl FnOnce(u32, u32) -> T) -> (u32, u32) {
        let reused = self
            .free_list
            .and_then(|index| match self.slots.get(index as usize) {
                Some(Slot::Free { generation, next }) => Some((index, *generation, *next)),
                _ => None,
            });
        let (index, generation) = match reused {
            Some((index, generation, next)) => {
                self.free_list = next;
                (index, generation)
            }
            None => {
                self.free_list = None;
                let index = self.slots.len() as u32;
                self.slots.push(Slot::Free {
                    generation: 0,
                    next: None,
                });
                (index, 0)
            }
        };
        self.slots[index as usize] = Slot::Occupied {
            generation,
            value: make(index, generation),
        };
        self.len += 1;
        (index, generation)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        match self.slots.get(index as usize)? {
            Slot::Occupied {
                generation: g,
                value,
            } if *g == generation => Some(value),
            _ => None,
        }
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize)? {
            Slot::Occupied {
                generation: g,
                value,
            } if *g == generation => Some(value),
            _ => None,
        }
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        self.get(index, generation)?;
        let freed = Slot::Free {
            generation: generation.wrapping_add(1),
            next: self.free_list,
        };
        let old = std::mem::replace(&mut self.slots[index as usize], freed);
        self.free_list = Some(index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        })
    }
}

/// An attachment point on a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    id: AnchorId,
    body: BodyId,
    site: AnchorSite,
    links: Vec<LinkId>,
}

impl Anchor {
    /// The anchor identifier.
    pub fn id(&self) -> AnchorId {
        self.id
    }

    /// The body owning this anchor.
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Where the anchor sits on its body's polygon.
    pub fn site(&self) -> AnchorSite {
        self.site
    }

    /// The links touching this anchor, in creation order.
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// Whether at least one link touches this anchor.
    pub fn is_linked(&self) -> bool {
        !self.links.is_empty()
    }
}

/// A link between two anchors, oriented from `source` to `destination`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    id: LinkId,
    source: AnchorId,
    destination: AnchorId,
    kind: LinkKind,
    constraint: ConstraintHandle,
}

impl Link {
    /// The link identifier, shared by both directions.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// The anchor the link starts from.
    pub fn source(&self) -> AnchorId {
        self.source
    }

    /// The anchor the link points to.
    pub fn destination(&self) -> AnchorId {
        self.destination
    }

    /// Rigid or soft.
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// The backend constraint materialising the link.
    pub fn constraint(&self) -> ConstraintHandle {
        self.constraint
    }

    /// The same link seen from its destination.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
            ..*self
        }
    }

    /// The endpoint opposite to `anchor`, if `anchor` is an endpoint.
    pub fn other(&self, anchor: AnchorId) -> Option<AnchorId> {
        if anchor == self.source {
            Some(self.destination)
        } else if anchor == self.destination {
            Some(self.source)
        } else {
            None
        }
    }
}

/// The graph of anchors and links of every body in the kernel.
#[derive(Debug, Clone, Default)]
pub struct AnchorGraph {
    anchors: Arena<Anchor>,
    links: Arena<Link>,
}

impl AnchorGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live anchors.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len
    }

    /// Number of live links (each counted once).
    pub fn link_count(&self) -> usize {
        self.links.len
    }

    /// Adds an anchor to `body` at `site`.
    pub fn add_anchor(&mut self, body: BodyId, site: AnchorSite) -> AnchorId {
        let (index, generation) = self.anchors.insert_with(|index, generation| Anchor {
            id: AnchorId { index, generation },
            body,
            site,
            links: Vec::new(),
        });
        AnchorId { index, generation }
    }

    /// Removes an anchor and every link touching it, returning the removed links.
    pub fn remove_anchor(&mut self, id: AnchorId) -> Result<Vec<Link>, GraphError> {
        let removed = self.detach(id)?;
        self.anchors.remove(id.index, id.generation);
        Ok(removed)
    }

    /// Looks up an anchor.
    pub fn anchor(&self, id: AnchorId) -> Result<&Anchor, GraphError> {
        self.anchors
            .get(id.index, id.generation)
            .ok_or(GraphError::UnknownAnchor(id))
    }

    /// Iterates over live anchors in slot order.
    pub fn anchors(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    /// Looks up a link, oriented as it was created.
    pub fn link(&self, id: LinkId) -> Result<&Link, GraphError> {
        self.links
            .get(id.index, id.generation)
            .ok_or(GraphError::UnknownLink(id))
    }

    /// Iterates over live links in slot order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// The links touching `anchor`, each oriented with `anchor` as source.
    pub fn links_from(&self, anchor: AnchorId) -> Result<Vec<Link>, GraphError> {
        let mut links = Vec::new();
        for id in self.anchor(anchor)?.links() {
            let link = self.link(*id)?;
            links.push(if link.source == anchor {
                *link
            } else {
                link.reversed()
            });
        }
        Ok(links)
    }

    /// The link joining `a` and `b`, in either direction.
    pub fn find_link(&self, a: AnchorId, b: AnchorId) -> Option<LinkId> {
        let anchor = self.anchors.get(a.index, a.generation)?;
        anchor.links.iter().copied().find(|id| {
            self.links
                .get(id.index, id.generation)
                .is_some_and(|link| link.other(a) == Some(b))
        })
    }

    /// Checks that a link between `source` and `destination` may be created.
    pub fn check_linkable(&self, source: AnchorId, destination: AnchorId) -> Result<(), GraphError> {
        let a = self.anchor(source)?;
        let b = self.anchor(destination)?;
        if a.body == b.body {
            return Err(GraphError::SameBody(source, destination));
        }
        if let Some(existing) = self.find_link(source, destination) {
            return Err(GraphError::AlreadyLinked(existing));
        }
        Ok(())
    }

    /// Inserts a link and its reverse.
    pub fn insert_link(
        &mut self,
        source: AnchorId,
        destination: AnchorId,
        kind: LinkKind,
        constraint: ConstraintHandle,
    ) -> Result<LinkId, GraphError> {
        self.check_linkable(source, destination)?;
        let (index, generation) = self.links.insert_with(|index, generation| Link {
            id: LinkId { index, generation },
            source,
            destination,
            kind,
            constraint,
        });
        let id = LinkId { index, generation };
        for anchor in [source, destination] {
            if let Some(anchor) = self.anchors.get_mut(anchor.index, anchor.generation) {
                anchor.links.push(id);
            }
        }
        Ok(id)
    }

    /// Removes a link from both of its anchors.
    pub fn remove_link(&mut self, id: LinkId) -> Result<Link, GraphError> {
        let link = self
            .links
            .remove(id.index, id.generation)
            .ok_or(GraphError::UnknownLink(id))?;
        for anchor in [link.source, link.destination] {
            if let Some(anchor) = self.anchors.get_mut(anchor.index, anchor.generation) {
                anchor.links.retain(|l| *l != id);
            }
        }
        Ok(link)
    }

    /// Removes every link touching `anchor`.
    pub fn detach(&mut self, anchor: AnchorId) -> Result<Vec<Link>, GraphError> {
        let ids = self.anchor(anchor)?.links.clone();
        ids.into_iter().map(|id| self.remove_link(id)).collect()
    }
}

/// Matches `min(k, |sources|, |destinations|)` disjoint `(source, destination)`
/// pairs whose total distance is the smallest possible. Pairs come back by
/// increasing distance; equal distances keep source order.
pub fn closest_pairs(
    sources: &[(AnchorId, Point)],
    destinations: &[(AnchorId, Point)],
    k: usize,
) -> Vec<(AnchorId, AnchorId)> {
    let size = k.min(sources.len()).min(destinations.len());
    if size == 0 {
        return Vec::new();
    }

    let costs: Vec<Vec<f64>> = sources
        .iter()
        .map(|(_, a)| destinations.iter().map(|(_, b)| a.distance(*b)).collect())
        .collect();
    let mut matching = Assignment::new(&costs);
    for _ in 0..size {
        if !matching.augment() {
            break;
        }
    }

    let mut pairs: Vec<(f64, usize, usize)> = matching
        .by_source
        .iter()
        .enumerate()
        .filter_map(|(i, j)| j.map(|j| (costs[i][j], i, j)))
        .collect();
    pairs.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
    pairs
        .into_iter()
        .map(|(_, i, j)| (sources[i].0, destinations[j].0))
        .collect()
}

/// Tolerance under which a shorter residual path is not worth re-routing.
const PATH_EPSILON: f64 = 1e-12;

/// Minimum-cost bipartite assignment grown one pair at a time.
///
/// Each augmentation follows the cheapest alternating path from a free source to a
/// free destination, so after `n` augmentations the matching has the smallest total
/// cost among all matchings of `n` pairs.
struct Assignment<'a> {
    costs: &'a [Vec<f64>],
    by_source: Vec<Option<usize>>,
    by_destination: Vec<Option<usize>>,
}

impl<'a> Assignment<'a> {
    fn new(costs: &'a [Vec<f64>]) -> Self {
        let width = costs.first().map_or(0, Vec::len);
        Self {
            costs,
            by_source: vec![None; costs.len()],
            by_destination: vec![None; width],
        }
    }

    /// Adds one pair along the cheapest augmenting path. Returns `false` when no
    /// free source or destination is left.
    fn augment(&mut self) -> bool {
        let (n, m) = (self.by_source.len(), self.by_destination.len());
        let mut to_source: Vec<f64> = self
            .by_source
            .iter()
            .map(|j| if j.is_none() { 0.0 } else { f64::INFINITY })
            .collect();
        let mut to_destination = vec![f64::INFINITY; m];
        let mut via_source: Vec<Option<usize>> = vec![None; m];
        let mut via_destination: Vec<Option<usize>> = vec![None; n];

        // Bellman-Ford over the residual graph: forward edges are unmatched pairs,
        // backward edges undo a matched pair at negative cost.
        for _ in 0..=(n + m) {
            let mut changed = false;
            for i in 0..n {
                if to_source[i].is_infinite() {
                    continue;
                }
                for j in 0..m {
                    if self.by_source[i] == Some(j) {
                        continue;
                    }
                    let reached = to_source[i] + self.costs[i][j];
                    if reached + PATH_EPSILON < to_destination[j] {
                        to_destination[j] = reached;
                        via_source[j] = Some(i);
                        changed = true;
                    }
                }
            }
            for j in 0..m {
                let Some(i) = self.by_destination[j] else {
                    continue;
                };
                let reached = to_destination[j] - self.costs[i][j];
                if reached + PATH_EPSILON < to_source[i] {
                    to_source[i] = reached;
                    via_destination[i] = Some(j);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let end = (0..m)
            .filter(|j| self.by_destination[*j].is_none() && to_destination[*j].is_finite())
            .min_by(|a, b| to_destination[*a].total_cmp(&to_destination[*b]));
        let Some(mut j) = end else {
            return false;
        };

        // Flip the path back to its free source.
        for _ in 0..=n {
            let Some(i) = via_source[j] else {
                break;
            };
            let previous = self.by_source[i];
            self.by_source[i] = Some(j);
            self.by_destination[j] = Some(i);
            match (previous, via_destination[i]) {
                (Some(_), Some(next)) => j = next,
                _ => break,
            }
        }
        true
    }
}

/// Pairs each source, in order, with its nearest destination not yet taken.
/// Sources left without a destination are dropped.
pub fn nearest_unused_pairs(
    sources: &[(AnchorId, Point)],
    destinations: &[(AnchorId, Point)],
) -> Vec<(AnchorId, AnchorId)> {
    let mut used = vec![false; destinations.len()];
    let mut pairs = Vec::new();
    for (source, at) in sources {
        let nearest = destinations
            .iter()
            .enumerate()
            .filter(|(j, _)| !used[*j])
            .min_by(|(_, (_, a)), (_, (_, b))| at.distance(*a).total_cmp(&at.distance(*b)));
        if let Some((j, (destination, _))) = nearest {
            used[j] = true;
            pairs.push((*source, *destination));
        }
    }
    pairs
}
