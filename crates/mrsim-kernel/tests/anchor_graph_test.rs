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

mod common;

use anyhow::Result;
use approx::assert_relative_eq;
use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::{LinkKind, Side};
use mrsim_kernel::catalog::{
    AttachClosestAnchors, AttractAndLinkAnchor, AttractAndLinkAnchorable,
    AttractAndLinkClosestAnchorable, CreateLink, CreateRigidBody, CreateUnmovableBody,
    DetachAllAnchorsFromAnchorable, RemoveBody, RemoveLink, SenseSideAttachment,
};
use mrsim_kernel::{ActionError, Kernel};

use common::{kernel, rigid_square, voxel_at};

fn assert_symmetric(kernel: &Kernel) {
    for link in kernel.graph().links() {
        let forward = kernel.graph().links_from(link.source()).unwrap();
        let backward = kernel.graph().links_from(link.destination()).unwrap();
        assert!(forward
            .iter()
            .any(|l| l.id() == link.id() && l.destination() == link.destination()));
        assert!(backward
            .iter()
            .any(|l| l.id() == link.id() && l.destination() == link.source()));
    }
}

#[test]
fn test_attach_adjacent_voxels_links_facing_sides() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let b = voxel_at(&mut kernel, 1.0, 0.0);

    let links = kernel.perform_as(
        AttachClosestAnchors {
            k: 2,
            source: a,
            destination: b,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(links.len(), 2);
    assert_eq!(kernel.graph().link_count(), 2);
    assert_symmetric(&kernel);

    let east = kernel.body(a).unwrap().side_anchors(Side::E);
    let west = kernel.body(b).unwrap().side_anchors(Side::W);
    for link in &links {
        let link = kernel.graph().link(*link)?;
        assert!(east.contains(&link.source()));
        assert!(west.contains(&link.destination()));
    }

    let attached = |kernel: &mut Kernel, side| {
        kernel
            .perform_as(SenseSideAttachment { body: a, side }, None)
            .unwrap()
    };
    assert_relative_eq!(attached(&mut kernel, Side::E), 1.0);
    assert_relative_eq!(attached(&mut kernel, Side::W), 0.0);
    assert_relative_eq!(attached(&mut kernel, Side::N), 0.5);
    Ok(())
}

#[test]
fn test_remove_link_removes_both_directions() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let b = voxel_at(&mut kernel, 1.0, 0.0);
    let links = kernel.perform_as(
        AttachClosestAnchors {
            k: 1,
            source: a,
            destination: b,
            kind: LinkKind::Soft,
        },
        None,
    )?;
    let link = *kernel.graph().link(links[0])?;

    kernel.perform_as(RemoveLink { link: link.id() }, None)?;
    assert_eq!(kernel.graph().link_count(), 0);
    assert!(!kernel.graph().anchor(link.source())?.is_linked());
    assert!(!kernel.graph().anchor(link.destination())?.is_linked());

    // Removing it again is a rejection, not a fault.
    assert!(matches!(
        kernel.perform_as(RemoveLink { link: link.id() }, None),
        Err(ActionError::Rejected(_))
    ));
    Ok(())
}

#[test]
fn test_attach_closest_anchors_is_bounded_by_anchor_counts() -> Result<()> {
    let mut kernel = kernel();
    let triangle = kernel.perform_as(
        CreateRigidBody {
            poly: Poly::new(vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(0.5, 1.0),
            ]),
            mass: 1.0,
            anchored: true,
        },
        None,
    )?;
    let ground = kernel.perform_as(
        CreateUnmovableBody {
            poly: Poly::rect(Point::new(-1.0, -1.0), 3.0, 1.0),
            anchored: true,
        },
        None,
    )?;

    let links = kernel.perform_as(
        AttachClosestAnchors {
            k: 5,
            source: triangle,
            destination: ground,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(links.len(), 3);

    let mut sources = Vec::new();
    let mut destinations = Vec::new();
    for id in &links {
        let link = kernel.graph().link(*id)?;
        sources.push(link.source());
        destinations.push(link.destination());
    }
    sources.sort_unstable();
    sources.dedup();
    destinations.sort_unstable();
    destinations.dedup();
    assert_eq!(sources.len(), 3);
    assert_eq!(destinations.len(), 3);

    let distance = |link: mrsim_kernel::LinkId| -> Result<f64> {
        let link = kernel.graph().link(link)?;
        Ok(kernel
            .anchor_position(link.source())?
            .distance(kernel.anchor_position(link.destination())?))
    };
    let distances = links.iter().map(|id| distance(*id)).collect::<Result<Vec<_>>>()?;
    assert!(distances.windows(2).all(|w| w[0] <= w[1] + 1e-12));

    // No other way of pairing three triangle anchors with ground anchors is shorter.
    let triangle_anchors = kernel
        .body(triangle)
        .unwrap()
        .anchors()
        .iter()
        .map(|a| kernel.anchor_position(*a))
        .collect::<Result<Vec<_>, _>>()?;
    let ground_anchors = kernel
        .body(ground)
        .unwrap()
        .anchors()
        .iter()
        .map(|a| kernel.anchor_position(*a))
        .collect::<Result<Vec<_>, _>>()?;
    let mut best = f64::INFINITY;
    for (i, a) in ground_anchors.iter().enumerate() {
        for (j, b) in ground_anchors.iter().enumerate() {
            for (l, c) in ground_anchors.iter().enumerate() {
                if i == j || j == l || i == l {
                    continue;
                }
                let total = triangle_anchors[0].distance(*a)
                    + triangle_anchors[1].distance(*b)
                    + triangle_anchors[2].distance(*c);
                best = best.min(total);
            }
        }
    }
    assert_relative_eq!(distances.iter().sum::<f64>(), best, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_attract_and_link_switches_at_threshold() -> Result<()> {
    let mut kernel = kernel();
    let a = rigid_square(&mut kernel, 0.0, 0.0, true);
    let far = rigid_square(&mut kernel, 1.05, 3.0, true);
    let near = rigid_square(&mut kernel, 1.02, 6.0, true);

    // Bring the bottom-left anchors level with the bottom-right anchor of `a`.
    let source = kernel.body(a).unwrap().anchors()[1];
    let far_anchor = kernel.body(far).unwrap().anchors()[0];
    let near_anchor = kernel.body(near).unwrap().anchors()[0];
    kernel.perform_as(
        mrsim_kernel::catalog::TranslateBody {
            body: far,
            translation: Point::new(0.0, -3.0),
        },
        None,
    )?;

    // Anchors are 0.05 inside a unit square, so the threshold is 1.1 * 0.1.
    let distance = kernel
        .anchor_position(source)?
        .distance(kernel.anchor_position(far_anchor)?);
    assert!(distance > 0.11 && distance < 1.0);
    let attracted = kernel.perform_as(
        AttractAndLinkAnchor {
            source,
            destination: far_anchor,
            magnitude: 3.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(attracted.force, Some(3.0));
    assert_eq!(attracted.link, None);

    kernel.perform_as(RemoveBody { body: far }, None)?;
    kernel.perform_as(
        mrsim_kernel::catalog::TranslateBody {
            body: near,
            translation: Point::new(0.0, -6.0),
        },
        None,
    )?;
    let linked = kernel.perform_as(
        AttractAndLinkAnchor {
            source,
            destination: near_anchor,
            magnitude: 3.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(linked.force, None);
    let link = linked.link.expect("anchors below threshold are linked");

    // Asking again returns the existing link.
    let again = kernel.perform_as(
        AttractAndLinkAnchor {
            source,
            destination: near_anchor,
            magnitude: 3.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(again.link, Some(link));
    assert_eq!(kernel.graph().link_count(), 1);
    Ok(())
}

#[test]
fn test_attract_and_link_anchorable_pairs_sources_in_order() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let b = voxel_at(&mut kernel, 1.05, 0.0);
    let sources = kernel.body(a).unwrap().side_anchors(Side::E);

    let results = kernel.perform_as(
        AttractAndLinkAnchorable {
            sources,
            destination: b,
            magnitude: 1.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.link.is_some() && r.force.is_none()));
    assert_eq!(kernel.graph().link_count(), 2);
    assert_symmetric(&kernel);
    Ok(())
}

#[test]
fn test_closest_anchorable_prefers_nearest_body() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let near = voxel_at(&mut kernel, 1.05, 0.0);
    let _far = voxel_at(&mut kernel, 3.5, 0.0);
    let sources = kernel.body(a).unwrap().side_anchors(Side::E);

    let results = kernel.perform_as(
        AttractAndLinkClosestAnchorable {
            sources: sources.clone(),
            magnitude: 1.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert_eq!(results.len(), 2);
    for result in &results {
        let link = kernel.graph().link(result.link.unwrap())?;
        assert_eq!(kernel.graph().anchor(link.destination())?.body(), near);
    }
    Ok(())
}

#[test]
fn test_closest_anchorable_out_of_range_is_empty() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let _lonely = voxel_at(&mut kernel, 50.0, 0.0);
    let sources = kernel.body(a).unwrap().anchors().to_vec();
    let results = kernel.perform_as(
        AttractAndLinkClosestAnchorable {
            sources,
            magnitude: 1.0,
            kind: LinkKind::Rigid,
        },
        None,
    )?;
    assert!(results.is_empty());
    Ok(())
}

#[test]
fn test_anchors_spanning_bodies_are_rejected() {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let b = voxel_at(&mut kernel, 1.0, 0.0);
    let sources = vec![
        kernel.body(a).unwrap().anchors()[0],
        kernel.body(b).unwrap().anchors()[0],
    ];
    let before = kernel.profile().illegal_actions;
    let result = kernel.perform_as(
        AttractAndLinkClosestAnchorable {
            sources,
            magnitude: 1.0,
            kind: LinkKind::Rigid,
        },
        None,
    );
    assert!(matches!(result, Err(ActionError::Rejected(_))));
    assert_eq!(kernel.profile().illegal_actions, before + 1);
}

#[test]
fn test_detach_all_and_remove_body_drop_links() -> Result<()> {
    let mut kernel = kernel();
    let a = voxel_at(&mut kernel, 0.0, 0.0);
    let b = voxel_at(&mut kernel, 1.0, 0.0);
    let c = voxel_at(&mut kernel, 0.0, 1.0);
    for other in [b, c] {
        kernel.perform_as(
            AttachClosestAnchors {
                k: 2,
                source: a,
                destination: other,
                kind: LinkKind::Rigid,
            },
            None,
        )?;
    }
    assert_eq!(kernel.graph().link_count(), 4);

    let removed = kernel.perform_as(DetachAllAnchorsFromAnchorable { body: b }, None)?;
    assert_eq!(removed.len(), 2);
    assert_eq!(kernel.graph().link_count(), 2);

    let anchors = kernel.body(c).unwrap().anchors().to_vec();
    kernel.perform_as(RemoveBody { body: c }, None)?;
    assert_eq!(kernel.graph().link_count(), 0);
    assert!(kernel.body(c).is_none());
    assert!(kernel.graph().anchor(anchors[0]).is_err());

    // Same-body links are refused.
    let own = kernel.body(a).unwrap().anchors().to_vec();
    assert!(matches!(
        kernel.perform_as(
            CreateLink {
                source: own[0],
                destination: own[1],
                kind: LinkKind::Rigid,
            },
            None,
        ),
        Err(ActionError::Rejected(_))
    ));
    Ok(())
}
