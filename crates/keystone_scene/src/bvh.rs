//! # Scene BVH
//!
//! A 4-wide bounding volume hierarchy rebuilt from scratch every frame.
//!
//! ```text
//! 1. union AABB of every element
//! 2. position → [0,1]³ relative to the union → 27-bit Morton code
//! 3. sort by code
//! 4. one leaf per 4 consecutive elements
//! 5. one interior node per 4 nodes of the previous level, until one remains
//! ```
//!
//! Nodes are stored level by level, leaves first; the root is the first node
//! of the last level.

use keystone_core::math::Vec3;

use crate::geometry::{Aabb, BoundingSphere, BoundingVolumeQuery};
use crate::scene::SceneEntityHandle;
use crate::transforms::NodeHandle;
use crate::visibility::VisibilityHandle;

/// Bits per axis in a Morton code.
pub const MORTON_BITS: u32 = 9;

const MORTON_MASK: u32 = (1 << MORTON_BITS) - 1;

/// Children per node.
pub const BRANCHING: usize = 4;

/// Interleaves three 9-bit coordinates, x in the high bit of each triple.
#[must_use]
pub const fn morton_code(x: u32, y: u32, z: u32) -> u32 {
    let (x, y, z) = (x & MORTON_MASK, y & MORTON_MASK, z & MORTON_MASK);
    let mut code = 0;
    let mut i = 0;
    while i < MORTON_BITS {
        let xb = (x >> i) & 1;
        let yb = (y >> i) & 1;
        let zb = (z >> i) & 1;
        code |= (xb << 2 | zb << 1 | yb) << (i * 3);
        i += 1;
    }
    code
}

/// Morton code of `position` inside `bounds`. Degenerate axes map to zero.
#[must_use]
pub fn morton_for(position: Vec3, bounds: &Aabb) -> u32 {
    let span = bounds.span();
    let quantize = |p: f32, min: f32, span: f32| -> u32 {
        if span <= f32::EPSILON {
            return 0;
        }
        let normalized = ((p - min) / span).clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let q = (normalized * MORTON_MASK as f32) as u32;
        q
    };
    morton_code(
        quantize(position.x, bounds.min.x, span.x),
        quantize(position.y, bounds.min.y, span.y),
        quantize(position.z, bounds.min.z, span.z),
    )
}

/// One entity as seen by the BVH builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhInput {
    /// Entity in its scene.
    pub entity: SceneEntityHandle,
    /// Visibility row of the entity.
    pub visibility: VisibilityHandle,
    /// Node placing the entity.
    pub node: NodeHandle,
    /// World position used for Morton ordering.
    pub position: Vec3,
    /// World bounding sphere.
    pub sphere: BoundingSphere,
    /// Included in ray casts.
    pub ray_visible: bool,
}

/// A leaf element of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhElement {
    /// Morton code of the element's position.
    pub morton: u32,
    /// Entity in its scene.
    pub entity: SceneEntityHandle,
    /// Visibility row of the entity.
    pub visibility: VisibilityHandle,
    /// Node placing the entity.
    pub node: NodeHandle,
    /// World bounds.
    pub aabb: Aabb,
    /// World bounding sphere.
    pub sphere: BoundingSphere,
    /// Included in ray casts.
    pub ray_visible: bool,
}

/// A node of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    /// Union of everything below.
    pub bounds: Aabb,
    /// First child: an element index for leaves, a node index otherwise.
    pub children: u32,
    /// Number of children, at most [`BRANCHING`].
    pub count: u8,
    /// `true` if the children are elements.
    pub leaf: bool,
}

/// Immutable per-frame spatial index.
#[derive(Debug, Clone, Default)]
pub struct SceneBvh {
    elements: Vec<BvhElement>,
    nodes: Vec<BvhNode>,
    root: usize,
}

impl SceneBvh {
    /// Builds the hierarchy.
    ///
    /// An empty input yields a single empty leaf wrapping a zero-size box.
    #[must_use]
    pub fn build(inputs: &[BvhInput]) -> Self {
        let world = inputs.iter().fold(Aabb::EMPTY, |acc, input| {
            acc.union(&Aabb::from_sphere(&input.sphere))
        });

        if inputs.is_empty() {
            return Self {
                elements: Vec::new(),
                nodes: vec![BvhNode {
                    bounds: Aabb::ZERO,
                    children: 0,
                    count: 0,
                    leaf: true,
                }],
                root: 0,
            };
        }

        let mut elements: Vec<BvhElement> = inputs
            .iter()
            .map(|input| BvhElement {
                morton: morton_for(input.position, &world),
                entity: input.entity,
                visibility: input.visibility,
                node: input.node,
                aabb: Aabb::from_sphere(&input.sphere),
                sphere: input.sphere,
                ray_visible: input.ray_visible,
            })
            .collect();
        elements.sort_by_key(|e| (e.morton, e.visibility));

        let mut nodes = Vec::with_capacity(elements.len() / 2 + 1);
        for (i, group) in elements.chunks(BRANCHING).enumerate() {
            nodes.push(BvhNode {
                bounds: group.iter().fold(Aabb::EMPTY, |acc, e| acc.union(&e.aabb)),
                children: to_u32(i * BRANCHING),
                count: to_u8(group.len()),
                leaf: true,
            });
        }

        let mut begin = 0;
        loop {
            let end = nodes.len();
            if end - begin <= 1 {
                break;
            }
            for start in (begin..end).step_by(BRANCHING) {
                let stop = (start + BRANCHING).min(end);
                let bounds = nodes[start..stop]
                    .iter()
                    .fold(Aabb::EMPTY, |acc, n| acc.union(&n.bounds));
                nodes.push(BvhNode {
                    bounds,
                    children: to_u32(start),
                    count: to_u8(stop - start),
                    leaf: false,
                });
            }
            begin = end;
        }

        tracing::trace!(elements = elements.len(), nodes = nodes.len(), "BVH built");
        Self {
            elements,
            nodes,
            root: begin,
        }
    }

    /// `false` until [`SceneBvh::build`] produced this value.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// The root node, `None` when not built.
    #[must_use]
    pub fn root(&self) -> Option<&BvhNode> {
        self.nodes.get(self.root)
    }

    /// Leaf elements in Morton order.
    #[must_use]
    pub fn elements(&self) -> &[BvhElement] {
        &self.elements
    }

    /// All nodes, leaves first.
    #[must_use]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Number of leaf elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// `true` if the hierarchy holds no element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Visits every element intersecting `shape`, descending only into
    /// intersecting nodes.
    pub fn traverse<Q, F>(&self, shape: &Q, mut visitor: F)
    where
        Q: BoundingVolumeQuery,
        F: FnMut(&BvhElement, Q::Hit),
    {
        let Some(root) = self.root() else {
            return;
        };
        let mut stack: Vec<&BvhNode> = Vec::with_capacity(32);
        stack.push(root);

        while let Some(node) = stack.pop() {
            if node.count == 0 || shape.intersects(&node.bounds).is_none() {
                continue;
            }
            let start = node.children as usize;
            let end = start + node.count as usize;
            if node.leaf {
                for element in &self.elements[start..end] {
                    if let Some(hit) = shape.intersects(&element.aabb) {
                        visitor(element, hit);
                    }
                }
            } else {
                stack.extend(self.nodes[start..end].iter().rev());
            }
        }
    }

    /// Collects the elements intersecting `shape`.
    #[must_use]
    pub fn query<Q: BoundingVolumeQuery>(&self, shape: &Q) -> Vec<BvhElement> {
        let mut hits = Vec::new();
        self.traverse(shape, |element, _| hits.push(*element));
        hits
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_u32(v: usize) -> u32 {
    debug_assert!(u32::try_from(v).is_ok());
    v as u32
}

#[allow(clippy::cast_possible_truncation)]
fn to_u8(v: usize) -> u8 {
    debug_assert!(v <= BRANCHING);
    v as u8
}
