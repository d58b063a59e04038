//! End-to-end behavior of the streaming engine.

#![allow(clippy::unwrap_used)]

use crate::{Bico, BicoConfig, Coreset, NnVariant};
use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};

const CENTERS: [[f64; 2]; 3] = [[10.0, 10.0], [110.0, 10.0], [60.0, 90.0]];

fn gaussian_stream(n: usize, sigma: f64, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    (0..n)
        .map(|_| {
            let c = CENTERS[rng.random_range(0..CENTERS.len())];
            vec![c[0] + noise.sample(&mut rng), c[1] + noise.sample(&mut rng)]
        })
        .collect()
}

fn run(config: BicoConfig, stream: &[Vec<f64>]) -> Bico {
    let mut bico = Bico::new(config).unwrap();
    for p in stream {
        bico.insert_slice(p).unwrap();
    }
    bico
}

#[test]
fn three_gaussians_coreset_is_small_and_complete() {
    let stream = gaussian_stream(10_000, 1.0, 2024);
    let bico = run(BicoConfig::new(2, 3, 200).with_seed(5), &stream);

    let coreset = bico.coreset().unwrap();
    assert!(coreset.len() <= 200, "coreset has {} points", coreset.len());
    assert_eq!(coreset.len() as u64, bico.node_count());
    assert_eq!(coreset.total_weight(), 10_000);
}

#[cfg(feature = "kmeans")]
#[test]
fn three_gaussians_kmeans_on_coreset_recovers_centers() {
    use crate::{Point, WeightedKmeans};

    let stream = gaussian_stream(10_000, 1.0, 7);
    let coreset = run(BicoConfig::new(2, 3, 200).with_seed(11), &stream)
        .into_coreset()
        .unwrap();

    let centers = WeightedKmeans::new(3)
        .with_seed(3)
        .fit_best_of(&coreset, 10)
        .unwrap();

    for truth in CENTERS {
        let truth = Point::new(truth.to_vec());
        let nearest = centers
            .iter()
            .map(|c| crate::squared_distance(c, &truth))
            .fold(f64::INFINITY, f64::min);
        assert!(nearest < 0.25, "center {truth} off by {}", nearest.sqrt());
    }
}

#[test]
fn rebuilds_grow_logarithmically() {
    let n = 10_000;
    let stream = gaussian_stream(n, 1.0, 99);
    let bico = run(BicoConfig::new(2, 3, 200).with_seed(1), &stream);

    let stats = bico.stats();
    assert!(stats.rebuilds > 0);
    assert!(
        (stats.rebuilds as f64) <= 4.0 * (n as f64).log2(),
        "{} rebuilds for {n} points",
        stats.rebuilds
    );
}

#[test]
fn old_tree_is_dropped_after_rebuild() {
    let stream = gaussian_stream(3_000, 2.0, 4);
    let mut bico = Bico::new(BicoConfig::new(2, 3, 50).with_seed(8)).unwrap();
    for p in &stream {
        bico.insert_slice(p).unwrap();
        if !bico.is_buffering() {
            // Root plus one node per live summary, nothing left over.
            assert_eq!(bico.root().iter().count() as u64, bico.node_count() + 1);
        }
    }
    assert!(bico.stats().rebuilds > 0);
}

#[test]
fn binary_hash_variant_respects_budget() {
    let stream = gaussian_stream(5_000, 1.0, 31);
    let config = BicoConfig::new(2, 4, 100)
        .with_nn_variant(NnVariant::BinaryHash)
        .with_seed(2);
    let bico = run(config, &stream);

    let coreset = bico.coreset().unwrap();
    assert!(coreset.len() <= 100);
    assert_eq!(coreset.total_weight(), 5_000);
}

#[test]
fn radius_filtered_grid_conserves_weight() {
    let stream = gaussian_stream(5_000, 1.0, 12);
    let config = BicoConfig::new(2, 3, 100)
        .with_radius_filter(true)
        .with_seed(6);
    let bico = run(config, &stream);
    assert_eq!(bico.coreset().unwrap().total_weight(), 5_000);
}

#[test]
fn engine_can_cross_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Bico>();
    assert_send::<Coreset>();
}

#[test]
fn shard_coresets_union_to_full_weight() {
    let stream = gaussian_stream(4_000, 1.0, 77);
    let (left, right) = stream.split_at(1_500);

    let mut union = Coreset::new();
    std::thread::scope(|scope| {
        let workers: Vec<_> = [left, right]
            .into_iter()
            .enumerate()
            .map(|(i, shard)| {
                let bico = Bico::new(BicoConfig::new(2, 3, 64).with_seed(i as u64)).unwrap();
                scope.spawn(move || {
                    let mut bico = bico;
                    for p in shard {
                        bico.insert_slice(p).unwrap();
                    }
                    bico.into_coreset().unwrap()
                })
            })
            .collect();
        for worker in workers {
            union.extend(worker.join().unwrap());
        }
    });
    assert_eq!(union.total_weight(), 4_000);
    assert!(union.len() <= 128);
}

#[test]
fn coreset_cost_tracks_full_cost() {
    let stream = gaussian_stream(6_000, 1.0, 55);
    let coreset = run(BicoConfig::new(2, 3, 150).with_seed(9), &stream)
        .into_coreset()
        .unwrap();

    let centers: Vec<crate::Point> = CENTERS
        .iter()
        .map(|c| crate::Point::new(c.to_vec()))
        .collect();
    let full: Coreset = stream
        .iter()
        .map(|p| crate::WeightedPoint::new(1, crate::Point::new(p.clone())))
        .collect();

    let exact = full.kmeans_cost(&centers).unwrap();
    let approx = coreset.kmeans_cost(&centers).unwrap();
    // Centroids can only lower the cost; the gap is the summarized variance.
    assert!(approx <= exact + 1e-6);
    assert!(approx > 0.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_point_is_accounted_for(
        points in proptest::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..300),
        k in 8usize..32,
        seed in any::<u64>(),
    ) {
        let config = BicoConfig::new(2, 3, k)
            .with_seed(seed)
            .with_fallback_threshold(1.0);
        let mut bico = Bico::new(config).unwrap();

        for (x, y) in points {
            bico.insert_point(vec![x, y]).unwrap();
            let stats = bico.stats();
            let coreset = bico.coreset().unwrap();

            prop_assert!(stats.node_count <= k as u64);
            prop_assert_eq!(coreset.len() as u64, stats.node_count);
            prop_assert_eq!(
                coreset.total_weight() + bico.buffered_len() as u64,
                stats.points_seen
            );
        }
    }
}
