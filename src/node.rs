//! One level of the BICO tree.
//!
//! ```text
//! Level 0:              [root]            (no CF of its own)
//!                      /   |   \
//! Level 1:          [cf]  [cf]  [cf]      (merge tolerance T, radius T/16)
//!                   / \          |
//! Level 2:       [cf] [cf]      [cf]      (merge tolerance T, radius T/32)
//! ```
//!
//! A node at level > 0 first tries to absorb an incoming CF into its own.
//! The merge is accepted when the 1-means cost of the combined CF, measured
//! against the node's *reference point*, stays below the threshold. Failing
//! that (and always at the root), the node asks its nearest-neighbor index
//! for a child whose reference is close, and descends. If none is found, a
//! new child is opened with the incoming CF as its summary.

use crate::error::{Error, Result};
use crate::feature::ClusteringFeature;
use crate::nearest_neighbor::{IndexParams, NearestNeighbor, NnVariant};
use log::{debug, error};
use rand::rngs::StdRng;
use std::time::{Duration, Instant};

/// Handle to a child, valid only within the node that issued it.
///
/// Handles are zero-based positions in the owning node's child list. They
/// are created and dereferenced only by [`TreeNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildHandle(usize);

impl ChildHandle {
    /// Position in the owning node's child list.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Outcome of [`TreeNode::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Absorbed into an existing summary.
    Merged,
    /// A new summary node was opened.
    Created,
}

/// Engine-wide state every node consults while inserting.
///
/// There is one threshold for the whole tree. Doubling it here is the only
/// thing a rebuild has to change before reinserting.
#[derive(Debug)]
pub(crate) struct TreeContext {
    pub(crate) dimension: usize,
    pub(crate) number_projections: usize,
    pub(crate) nn_variant: NnVariant,
    pub(crate) radius_filter: bool,
    pub(crate) threshold: f64,
    pub(crate) rng: StdRng,
    /// Accumulated index query time per level, when tracking is on.
    pub(crate) nn_time: Option<Vec<Duration>>,
}

impl TreeContext {
    /// Merge threshold at `level`. Currently the same for every level.
    pub(crate) fn threshold(&self, _level: u32) -> f64 {
        self.threshold
    }

    /// Neighborhood radius at `level`: `T / 2^(3 + level)`.
    pub(crate) fn radius(&self, level: u32) -> f64 {
        self.threshold / 2f64.powi(3 + level as i32)
    }

    fn record_query(&mut self, level: u32, elapsed: Duration) {
        if let Some(times) = self.nn_time.as_mut() {
            let level = level as usize;
            if times.len() <= level {
                times.resize(level + 1, Duration::ZERO);
            }
            times[level] += elapsed;
        }
    }
}

/// A node of the BICO tree.
pub struct TreeNode {
    level: u32,
    cf: ClusteringFeature,
    index: Box<dyn NearestNeighbor<ChildHandle>>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// An empty root.
    pub(crate) fn root(ctx: &mut TreeContext) -> Self {
        let cf = ClusteringFeature::empty(ctx.dimension);
        Self::new(0, cf, ctx)
    }

    pub(crate) fn new(level: u32, cf: ClusteringFeature, ctx: &mut TreeContext) -> Self {
        let params = IndexParams {
            dimension: ctx.dimension,
            number_projections: ctx.number_projections,
            radius: ctx.radius(level),
            radius_filter: ctx.radius_filter,
        };
        Self {
            level,
            cf,
            index: ctx.nn_variant.build(&params, &mut ctx.rng),
            children: Vec::new(),
        }
    }

    /// Depth of this node; the root is level 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The node's summary. Unused at the root.
    pub fn cf(&self) -> &ClusteringFeature {
        &self.cf
    }

    /// Direct children, in creation order.
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Pre-order iterator over this node and all its descendants.
    pub fn iter(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }

    /// Insert a CF into the subtree rooted here.
    pub(crate) fn insert(
        &mut self,
        point_cf: ClusteringFeature,
        ctx: &mut TreeContext,
    ) -> Result<Insertion> {
        let mut node = self;
        loop {
            if node.level > 0 {
                if node.cf.is_empty() {
                    node.cf = point_cf;
                    return Ok(Insertion::Merged);
                }
                let trial = node.cf.combine(&point_cf);
                let cost = trial.kmeans_cost(node.cf.reference());
                let threshold = ctx.threshold(node.level);
                debug!(
                    "level {}: merge cost {cost} vs threshold {threshold}",
                    node.level
                );
                if cost < threshold {
                    node.cf = trial;
                    return Ok(Insertion::Merged);
                }
            }

            match node.nearest_child(&point_cf, ctx) {
                Some(handle) => node = node.child_mut(handle)?,
                None => {
                    node.open_child(point_cf, ctx)?;
                    return Ok(Insertion::Created);
                }
            }
        }
    }

    /// Detach all children, leaving this node childless.
    pub(crate) fn take_children(&mut self) -> Vec<TreeNode> {
        std::mem::take(&mut self.children)
    }

    /// Consume the node, keeping only its summary.
    pub(crate) fn into_cf(self) -> ClusteringFeature {
        self.cf
    }

    fn nearest_child(
        &self,
        point_cf: &ClusteringFeature,
        ctx: &mut TreeContext,
    ) -> Option<ChildHandle> {
        if self.children.is_empty() {
            return None;
        }
        let start = ctx.nn_time.is_some().then(Instant::now);
        let nearest = self
            .index
            .get_candidates(point_cf.reference())
            .first()
            .map(|c| c.metadata);
        if let Some(start) = start {
            ctx.record_query(self.level, start.elapsed());
        }
        nearest
    }

    fn child_mut(&mut self, handle: ChildHandle) -> Result<&mut TreeNode> {
        let len = self.children.len();
        let level = self.level;
        self.children.get_mut(handle.0).ok_or_else(|| {
            error!("level {level}: child handle {} out of range ({len} children)", handle.0);
            Error::InternalInvariantViolation(format!(
                "child handle {} out of range for {len} children at level {level}",
                handle.0
            ))
        })
    }

    fn open_child(&mut self, point_cf: ClusteringFeature, ctx: &mut TreeContext) -> Result<()> {
        if self.index.len() != self.children.len() {
            error!(
                "level {}: index holds {} references for {} children",
                self.level,
                self.index.len(),
                self.children.len()
            );
            return Err(Error::InternalInvariantViolation(format!(
                "index/child count mismatch at level {}: {} != {}",
                self.level,
                self.index.len(),
                self.children.len()
            )));
        }
        let handle = ChildHandle(self.children.len());
        self.index.insert_candidate(point_cf.reference(), handle);
        let child = TreeNode::new(self.level + 1, point_cf, ctx);
        self.children.push(child);
        Ok(())
    }
}

impl core::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeNode")
            .field("level", &self.level)
            .field("cf", &self.cf)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Pre-order traversal driven by an explicit stack.
pub struct Nodes<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::point::Point;
    use rand::SeedableRng;

    fn context(threshold: f64) -> TreeContext {
        TreeContext {
            dimension: 2,
            number_projections: 3,
            nn_variant: NnVariant::Grid,
            radius_filter: false,
            threshold,
            rng: StdRng::seed_from_u64(11),
            nn_time: None,
        }
    }

    fn cf(x: f64, y: f64) -> ClusteringFeature {
        ClusteringFeature::singleton(Point::new(vec![x, y]))
    }

    #[test]
    fn test_radius_shrinks_with_depth() {
        let ctx = context(64.0);
        assert_eq!(ctx.radius(0), 8.0);
        assert_eq!(ctx.radius(1), 4.0);
        assert_eq!(ctx.radius(2), 2.0);
        assert_eq!(ctx.threshold(5), 64.0);
    }

    #[test]
    fn test_root_never_absorbs() {
        let mut ctx = context(100.0);
        let mut root = TreeNode::root(&mut ctx);

        assert_eq!(root.insert(cf(1.0, 1.0), &mut ctx).unwrap(), Insertion::Created);
        assert!(root.cf().is_empty());
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].level(), 1);
        assert_eq!(root.children()[0].cf().size(), 1);
    }

    #[test]
    fn test_identical_point_routes_to_existing_child() {
        let mut ctx = context(100.0);
        let mut root = TreeNode::root(&mut ctx);

        root.insert(cf(1.0, 1.0), &mut ctx).unwrap();
        assert_eq!(root.insert(cf(1.0, 1.0), &mut ctx).unwrap(), Insertion::Merged);
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].cf().size(), 2);
    }

    #[test]
    fn test_empty_node_absorbs_unconditionally() {
        let mut ctx = context(1e-9);
        let mut node = TreeNode::new(1, ClusteringFeature::empty(2), &mut ctx);

        assert_eq!(node.insert(cf(50.0, 50.0), &mut ctx).unwrap(), Insertion::Merged);
        assert_eq!(node.cf().reference(), &Point::new(vec![50.0, 50.0]));
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_merge_cost_uses_stable_reference() {
        let mut ctx = context(100.0);
        let mut node = TreeNode::new(1, cf(0.0, 0.0), &mut ctx);

        // Cost against (0,0): 36, then 72, then 108.
        assert_eq!(node.insert(cf(6.0, 0.0), &mut ctx).unwrap(), Insertion::Merged);
        assert_eq!(node.insert(cf(6.0, 0.0), &mut ctx).unwrap(), Insertion::Merged);
        assert_eq!(node.insert(cf(6.0, 0.0), &mut ctx).unwrap(), Insertion::Created);

        assert_eq!(node.cf().size(), 3);
        assert_eq!(node.cf().reference(), &Point::new(vec![0.0, 0.0]));
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.children()[0].level(), 2);
        assert_eq!(node.children()[0].cf().reference(), &Point::new(vec![6.0, 0.0]));
    }

    #[test]
    fn test_child_handles_resolve_to_their_child() {
        let mut ctx = context(1e-6);
        let mut root = TreeNode::root(&mut ctx);
        for i in 0..20 {
            root.insert(cf(i as f64 * 100.0, 0.0), &mut ctx).unwrap();
        }

        for (pos, child) in root.children().iter().enumerate() {
            let found = root.index.get_candidates(child.cf().reference());
            assert_eq!(found[0].metadata.index(), pos);
            assert_eq!(found[0].distance, 0.0);
        }
    }

    #[test]
    fn test_iter_visits_every_node_once() {
        let mut ctx = context(1.0);
        let mut root = TreeNode::root(&mut ctx);
        let mut created = 0;
        for i in 0..50 {
            let p = cf((i % 7) as f64 * 3.0, (i % 5) as f64 * 2.0);
            if root.insert(p, &mut ctx).unwrap() == Insertion::Created {
                created += 1;
            }
        }

        let nodes: Vec<&TreeNode> = root.iter().collect();
        assert_eq!(nodes.len(), created + 1);
        let weight: u64 = nodes.iter().map(|n| n.cf().size()).sum();
        assert_eq!(weight, 50);
    }

    #[test]
    fn test_unregistered_child_is_detected() {
        let mut ctx = context(100.0);
        let mut root = TreeNode::root(&mut ctx);
        let stray = TreeNode::new(1, cf(5.0, 5.0), &mut ctx);
        root.children.push(stray);

        // The index knows no children, so the point asks for a new one.
        assert!(matches!(
            root.insert(cf(-40.0, 70.0), &mut ctx),
            Err(Error::InternalInvariantViolation(_))
        ));
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_dangling_child_handle_is_detected() {
        let mut ctx = context(100.0);
        let mut root = TreeNode::root(&mut ctx);
        root.insert(cf(1000.0, 1000.0), &mut ctx).unwrap();
        root.index.insert_candidate(&Point::new(vec![0.0, 0.0]), ChildHandle(5));

        assert!(matches!(
            root.insert(cf(0.0, 0.0), &mut ctx),
            Err(Error::InternalInvariantViolation(_))
        ));
    }

    #[test]
    fn test_query_time_tracked_per_level() {
        let mut ctx = context(100.0);
        ctx.nn_time = Some(Vec::new());
        let mut root = TreeNode::root(&mut ctx);
        root.insert(cf(0.0, 0.0), &mut ctx).unwrap();
        root.insert(cf(0.0, 0.0), &mut ctx).unwrap();
        assert_eq!(ctx.nn_time.as_ref().unwrap().len(), 1);
    }
}
