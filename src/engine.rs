//! The BICO streaming engine.
//!
//! # Phases
//!
//! ```text
//!  insert_point ──► Buffering ──(|buffer| > √k)──► Streaming ──► ...
//!                   collect points                 root.insert(singleton CF)
//!                                                  rebuild while nodes > k
//! ```
//!
//! **Buffering.** The first `⌊√k⌋ + 1` points are only collected. The
//! smallest strictly positive squared distance among them, times 16, becomes
//! the initial merge threshold `T`, and the buffer is replayed in order.
//!
//! **Streaming.** Every point becomes a singleton clustering feature and is
//! inserted at the root. Each newly opened summary node counts against the
//! budget `k`.
//!
//! **Rebuild.** When more than `k` summary nodes exist, `T` doubles and every
//! summary of the old tree is reinserted into a fresh one. The old tree is
//! consumed through an explicit worklist, so deep trees never grow the call
//! stack and each old node is dropped as soon as its summary is reinserted.
//! Since `T` at least doubles per rebuild, a stream of n points triggers
//! O(log n) rebuilds.
//!
//! The budget is soft. Grid buckets always split at the origin, so data on
//! both sides of it keeps one root summary per occupied sign cell however
//! large `T` grows. After several consecutive rebuilds that do not shrink
//! the tree, the engine accepts the current count and rebuilds again only
//! once the count rises above it.
//!
//! # References
//!
//! Fichtenberger, Gillé, Schmidt, Schwiegelshohn, Sohler (2013).
//! "BICO: BIRCH Meets Coresets for k-Means Clustering." ESA.

use crate::coreset::{Coreset, WeightedPoint};
use crate::error::{Error, Result};
use crate::feature::ClusteringFeature;
use crate::nearest_neighbor::NnVariant;
use crate::node::{Insertion, TreeContext, TreeNode};
use crate::point::{squared_distance, Point};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Threshold in effect before the buffer phase ends.
const INITIAL_THRESHOLD: f64 = 1.0;

/// Consecutive rebuilds that fail to shrink the tree before the engine stops
/// chasing the budget.
const MAX_FRUITLESS_REBUILDS: u32 = 8;

/// Configuration for a [`Bico`] engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BicoConfig {
    /// Dimension of every input point.
    pub dimension: usize,
    /// Random directions per nearest-neighbor index. More projections mean
    /// fewer distance computations per query but more memory per node.
    pub number_projections: usize,
    /// Maximum number of summaries (coreset points) kept.
    pub coreset_size: usize,
    /// Nearest-neighbor index used at every tree level.
    pub nn_variant: NnVariant,
    /// Seed for the random projections.
    pub seed: Option<u64>,
    /// Initial threshold used when all buffered points coincide.
    pub fallback_threshold: Option<f64>,
    /// Apply a hard radius cutoff in the grid index.
    pub radius_filter: bool,
    /// Accumulate nearest-neighbor query time per tree level.
    pub track_time: bool,
}

impl BicoConfig {
    /// Create a configuration with the grid index and no seed.
    pub fn new(dimension: usize, number_projections: usize, coreset_size: usize) -> Self {
        Self {
            dimension,
            number_projections,
            coreset_size,
            nn_variant: NnVariant::Grid,
            seed: None,
            fallback_threshold: None,
            radius_filter: false,
            track_time: false,
        }
    }

    /// Set the nearest-neighbor index variant.
    pub fn with_nn_variant(mut self, variant: NnVariant) -> Self {
        self.nn_variant = variant;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use `threshold` instead of failing when the buffer is degenerate.
    pub fn with_fallback_threshold(mut self, threshold: f64) -> Self {
        self.fallback_threshold = Some(threshold);
        self
    }

    /// Enable or disable the grid index radius cutoff.
    pub fn with_radius_filter(mut self, enabled: bool) -> Self {
        self.radius_filter = enabled;
        self
    }

    /// Enable or disable per-level query timing.
    pub fn with_track_time(mut self, enabled: bool) -> Self {
        self.track_time = enabled;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig {
                name: "dimension",
                message: "must be at least 1",
            });
        }
        if self.number_projections == 0 {
            return Err(Error::InvalidConfig {
                name: "number_projections",
                message: "must be at least 1",
            });
        }
        if self.coreset_size == 0 {
            return Err(Error::InvalidConfig {
                name: "coreset_size",
                message: "must be at least 1",
            });
        }
        if let Some(t) = self.fallback_threshold {
            if !(t.is_finite() && t > 0.0) {
                return Err(Error::InvalidConfig {
                    name: "fallback_threshold",
                    message: "must be finite and positive",
                });
            }
        }
        Ok(())
    }
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicoStats {
    /// Points accepted so far, buffered ones included.
    pub points_seen: u64,
    /// Live summary nodes.
    pub node_count: u64,
    /// Rebuilds performed.
    pub rebuilds: u64,
    /// Current merge threshold.
    pub threshold: f64,
    /// Still in the buffer phase.
    pub buffering: bool,
}

enum Phase {
    Buffering(Vec<Point>),
    Streaming,
}

/// Streaming coreset construction for k-means.
///
/// ```rust
/// use bico::{Bico, BicoConfig};
///
/// let mut bico = Bico::new(BicoConfig::new(2, 3, 16).with_seed(7)).unwrap();
/// for i in 0..500 {
///     let x = (i % 10) as f64;
///     let y = (i % 7) as f64;
///     bico.insert_point(vec![x, y]).unwrap();
/// }
///
/// let coreset = bico.coreset().unwrap();
/// assert!(coreset.len() <= 16);
/// assert_eq!(coreset.total_weight(), 500);
/// ```
pub struct Bico {
    config: BicoConfig,
    ctx: TreeContext,
    root: TreeNode,
    phase: Phase,
    node_count: u64,
    points_seen: u64,
    rebuilds: u64,
    /// Node count at which rebuilding stopped paying off.
    stalled_at: Option<u64>,
    poisoned: bool,
}

impl Bico {
    /// Create an engine from a validated configuration.
    pub fn new(config: BicoConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut ctx = TreeContext {
            dimension: config.dimension,
            number_projections: config.number_projections,
            nn_variant: config.nn_variant,
            radius_filter: config.radius_filter,
            threshold: INITIAL_THRESHOLD,
            rng,
            nn_time: config.track_time.then(Vec::new),
        };
        let root = TreeNode::root(&mut ctx);

        Ok(Self {
            config,
            ctx,
            root,
            phase: Phase::Buffering(Vec::new()),
            node_count: 0,
            points_seen: 0,
            rebuilds: 0,
            stalled_at: None,
            poisoned: false,
        })
    }

    /// Shorthand for [`Bico::new`] with positional parameters.
    pub fn with_params(
        dimension: usize,
        number_projections: usize,
        coreset_size: usize,
        nn_variant: NnVariant,
    ) -> Result<Self> {
        Self::new(
            BicoConfig::new(dimension, number_projections, coreset_size).with_nn_variant(nn_variant),
        )
    }

    /// Insert one point from the stream.
    ///
    /// The call is all-or-nothing: a rejected point leaves the engine as it
    /// was.
    pub fn insert_point(&mut self, point: impl Into<Point>) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let point = point.into();
        point.validate(self.config.dimension)?;

        if matches!(self.phase, Phase::Buffering(_)) {
            self.insert_buffered(point)?;
        } else {
            self.insert_streaming(point)?;
        }
        self.points_seen += 1;
        Ok(())
    }

    /// Insert one point given as a slice.
    pub fn insert_slice(&mut self, coords: &[f64]) -> Result<()> {
        self.insert_point(coords)
    }

    fn insert_buffered(&mut self, point: Point) -> Result<()> {
        let Phase::Buffering(mut buffer) = std::mem::replace(&mut self.phase, Phase::Streaming)
        else {
            return self.insert_streaming(point);
        };
        let limit = (self.config.coreset_size as f64).sqrt();
        if ((buffer.len() + 1) as f64) <= limit {
            buffer.push(point);
            self.phase = Phase::Buffering(buffer);
            return Ok(());
        }

        let threshold = match min_positive_squared_distance(&buffer, &point) {
            Some(d) => 16.0 * d,
            None => match self.config.fallback_threshold {
                Some(t) => {
                    warn!(
                        "all {} buffered points coincide; using fallback threshold {t}",
                        buffer.len() + 1
                    );
                    t
                }
                None => {
                    let buffered = buffer.len() + 1;
                    self.phase = Phase::Buffering(buffer);
                    return Err(Error::DegenerateBuffer { buffered });
                }
            },
        };
        buffer.push(point);

        info!(
            "buffer phase finished with {} points; initial threshold {threshold}",
            buffer.len()
        );
        self.ctx.threshold = threshold;
        self.root = TreeNode::root(&mut self.ctx);
        for p in buffer {
            self.insert_streaming(p)?;
        }
        Ok(())
    }

    fn insert_streaming(&mut self, point: Point) -> Result<()> {
        let cf = ClusteringFeature::singleton(point);
        match self.root.insert(cf, &mut self.ctx) {
            Ok(Insertion::Created) => self.node_count += 1,
            Ok(Insertion::Merged) => {}
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        }
        let budget = self.config.coreset_size as u64;
        let mut fruitless = 0;
        while self.node_count > budget {
            if self.stalled_at.is_some_and(|stalled| self.node_count <= stalled) {
                return Ok(());
            }
            let before = self.node_count;
            if let Err(e) = self.rebuild() {
                self.poisoned = true;
                return Err(e);
            }
            if self.node_count < before {
                fruitless = 0;
                continue;
            }
            fruitless += 1;
            if fruitless >= MAX_FRUITLESS_REBUILDS {
                warn!(
                    "{} summaries survive {fruitless} rebuilds up to threshold {}; \
                     budget of {budget} is out of reach",
                    self.node_count, self.ctx.threshold
                );
                self.stalled_at = Some(self.node_count);
                return Ok(());
            }
        }
        self.stalled_at = None;
        Ok(())
    }

    /// Double the threshold and reinsert every summary into a fresh tree.
    fn rebuild(&mut self) -> Result<()> {
        let threshold = self.ctx.threshold * 2.0;
        if !threshold.is_finite() {
            error!("rebuild threshold overflowed after {} rebuilds", self.rebuilds);
            return Err(Error::InternalInvariantViolation(format!(
                "threshold {} cannot be doubled",
                self.ctx.threshold
            )));
        }
        self.ctx.threshold = threshold;
        let before = self.node_count;

        let fresh = TreeNode::root(&mut self.ctx);
        let mut old_root = std::mem::replace(&mut self.root, fresh);
        let mut worklist = old_root.take_children();
        drop(old_root);

        let mut created = 0;
        while let Some(mut node) = worklist.pop() {
            worklist.append(&mut node.take_children());
            if self.root.insert(node.into_cf(), &mut self.ctx)? == Insertion::Created {
                created += 1;
            }
        }

        self.node_count = created;
        self.rebuilds += 1;
        info!("rebuilt tree with threshold {threshold}: {before} -> {created} summaries");
        Ok(())
    }

    /// The current coreset: one weighted centroid per summary node.
    ///
    /// Points still held in the buffer phase are not included; see
    /// [`Bico::into_coreset`].
    pub fn coreset(&self) -> Result<Coreset> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        self.root
            .iter()
            .filter(|node| node.level() > 0 && !node.cf().is_empty())
            .map(|node| {
                let cf = node.cf();
                Ok(WeightedPoint::new(cf.size(), cf.centroid()?))
            })
            .collect()
    }

    /// Alias of [`Bico::coreset`].
    pub fn get_coreset(&self) -> Result<Coreset> {
        self.coreset()
    }

    /// Finish the stream. Points still buffered are emitted with weight 1,
    /// so every accepted point is represented.
    pub fn into_coreset(self) -> Result<Coreset> {
        let mut coreset = self.coreset()?;
        if let Phase::Buffering(buffer) = self.phase {
            coreset.extend(buffer.into_iter().map(|p| WeightedPoint::new(1, p)));
        }
        Ok(coreset)
    }

    /// Current merge threshold.
    pub fn threshold(&self) -> f64 {
        self.ctx.threshold
    }

    /// Live summary nodes.
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// True until the bootstrap threshold has been derived.
    pub fn is_buffering(&self) -> bool {
        matches!(self.phase, Phase::Buffering(_))
    }

    /// Points held in the buffer and not yet in the tree.
    pub fn buffered_len(&self) -> usize {
        match &self.phase {
            Phase::Buffering(buffer) => buffer.len(),
            Phase::Streaming => 0,
        }
    }

    /// True once a failed operation left the engine unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Engine counters.
    pub fn stats(&self) -> BicoStats {
        BicoStats {
            points_seen: self.points_seen,
            node_count: self.node_count,
            rebuilds: self.rebuilds,
            threshold: self.ctx.threshold,
            buffering: self.is_buffering(),
        }
    }

    /// Accumulated nearest-neighbor query time per tree level, if tracked.
    pub fn nn_query_time(&self) -> Option<&[Duration]> {
        self.ctx.nn_time.as_deref()
    }

    /// The engine configuration.
    pub fn config(&self) -> &BicoConfig {
        &self.config
    }

    /// Root of the summary tree.
    pub fn root(&self) -> &TreeNode {
        &self.root
    }
}

impl core::fmt::Debug for Bico {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bico")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Smallest strictly positive squared distance among `buffer ∪ {last}`.
fn min_positive_squared_distance(buffer: &[Point], last: &Point) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (i, a) in buffer.iter().enumerate() {
        for b in buffer[i + 1..].iter().chain(std::iter::once(last)) {
            let d = squared_distance(a, b);
            if d > 0.0 && best.is_none_or(|m| d < m) {
                best = Some(d);
            }
        }
    }
    best
}
