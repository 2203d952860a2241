//! Conservation and shape tests for the discretised generator.
//!
//! The generator of a probability-conserving process has zero row sums;
//! these tests check that property across schemes, meshes, basis counts and
//! boundary variants, together with the expected operator dimensions.

use faer::Mat;
use fluq_rs::{
    build_full_generator, build_lazy_generator, materialise, DiscretisedFluidQueue, FluidQueue,
    Mesh, MeParams, PhaseSet,
};

const ROW_SUM_TOL: f64 = 1e-8;

fn three_phase_set() -> PhaseSet {
    let mut t = Mat::zeros(3, 3);
    t[(0, 0)] = -2.0;
    t[(0, 1)] = 1.0;
    t[(0, 2)] = 1.0;
    t[(1, 0)] = 3.0;
    t[(1, 1)] = -4.0;
    t[(1, 2)] = 1.0;
    t[(2, 0)] = 1.0;
    t[(2, 1)] = 1.0;
    t[(2, 2)] = -2.0;
    PhaseSet::with_default_membership(vec![2.0, -1.0, 0.0], t).unwrap()
}

fn assert_zero_row_sums(dq: &DiscretisedFluidQueue, label: &str) {
    let full = build_full_generator(dq).unwrap();
    for (i, s) in full.row_sums().iter().enumerate() {
        assert!(
            s.abs() < ROW_SUM_TOL,
            "{}: row {} sums to {}",
            label,
            i,
            s
        );
    }
}

#[test]
fn test_dg_three_phase_shape_and_row_sums() {
    // Three phases with drifts (2, -1, 0) over cells [0,1,2,3,4] and three
    // basis functions per cell: 2 + 3*4*3 + 2 = 40 coordinates.
    let mesh = Mesh::dg(vec![0.0, 1.0, 2.0, 3.0, 4.0], 3).unwrap();
    let dq = DiscretisedFluidQueue::new(FluidQueue::new(three_phase_set()), mesh);
    assert_eq!(dq.order(), 40);

    let full = build_full_generator(&dq).unwrap();
    assert_eq!(full.shape(), (40, 40));
    assert_zero_row_sums(&dq, "DG three-phase");
}

#[test]
fn test_frap_three_phase_shape_and_row_sums() {
    let mesh = Mesh::frap(vec![0.0, 1.0, 2.0, 3.0, 4.0], MeParams::erlang(3, 2.0)).unwrap();
    let dq = DiscretisedFluidQueue::new(FluidQueue::new(three_phase_set()), mesh);
    assert_eq!(dq.order(), 40);

    let full = build_full_generator(&dq).unwrap();
    assert_eq!(full.shape(), (40, 40));
    assert_zero_row_sums(&dq, "FRAP three-phase");
}

#[test]
fn test_frap_square_matches_dense_reference() {
    let mesh = Mesh::frap(vec![0.0, 1.0, 2.0, 3.0, 4.0], MeParams::erlang(2, 1.5)).unwrap();
    let dq = DiscretisedFluidQueue::new(FluidQueue::new(three_phase_set()), mesh);
    let full = build_full_generator(&dq).unwrap();

    let square = &full * &full;
    let dense = full.to_dense();
    let (m, _) = full.shape();
    for row in 0..m {
        for col in 0..m {
            let mut expected = 0.0;
            for k in 0..m {
                expected += dense[(row, k)] * dense[(k, col)];
            }
            assert!(
                (square.get(row, col).unwrap() - expected).abs() < 1e-3,
                "B*B disagrees with the dense product at ({}, {})",
                row,
                col
            );
        }
    }
}

#[test]
fn test_dg_and_frap_sizes_coincide() {
    // Identical (N, K, p) gives identical operator size for both schemes.
    for p in 1..=3 {
        let dg = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 3.0, 3, p).unwrap(),
        );
        let frap = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::frap(vec![0.0, 1.0, 2.0, 3.0], MeParams::erlang(p, 1.0)).unwrap(),
        );
        assert_eq!(dg.order(), frap.order());
        let full_dg = build_full_generator(&dg).unwrap();
        let full_frap = build_full_generator(&frap).unwrap();
        assert_eq!(full_dg.shape(), full_frap.shape());
        assert_eq!(full_dg.shape().0, 2 + 3 * 3 * p + 2);
    }
}

#[test]
fn test_conservation_sweep() {
    // Uniform and graded meshes, both schemes, several basis counts.
    let graded = vec![0.0, 0.4, 1.0, 2.5, 4.0];
    for p in 1..=4 {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg(graded.clone(), p).unwrap(),
        );
        assert_zero_row_sums(&dq, "graded DG");

        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 2.0, 5, p).unwrap(),
        );
        assert_zero_row_sums(&dq, "uniform DG");

        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::frap(graded.clone(), MeParams::erlang(p, 0.75)).unwrap(),
        );
        assert_zero_row_sums(&dq, "graded FRAP");
    }
}

#[test]
fn test_conservation_bounded_variant() {
    let n = 3;
    let mut p_lwr = Mat::zeros(n, n);
    p_lwr[(1, 0)] = 0.5; // reflect into the up-drifting phase
    p_lwr[(1, 1)] = 0.3; // stick in own point mass
    p_lwr[(1, 2)] = 0.2;
    let mut p_upr = Mat::zeros(n, n);
    p_upr[(0, 1)] = 0.25; // reflect into the down-drifting phase
    p_upr[(0, 0)] = 0.5;
    p_upr[(0, 2)] = 0.25;
    let queue = FluidQueue::bounded(three_phase_set(), p_lwr, p_upr).unwrap();

    let dq = DiscretisedFluidQueue::new(queue, Mesh::dg(vec![0.0, 0.5, 1.5, 3.0], 2).unwrap());
    assert_zero_row_sums(&dq, "bounded DG");
}

#[test]
fn test_conservation_full_boundary_membership() {
    // Both phases own point masses at both barriers.
    let mut t = Mat::zeros(2, 2);
    t[(0, 0)] = -1.0;
    t[(0, 1)] = 1.0;
    t[(1, 0)] = 2.0;
    t[(1, 1)] = -2.0;
    let phases = PhaseSet::new(
        vec![1.0, -1.0],
        t,
        vec![true, true],
        vec![true, true],
    )
    .unwrap();
    let dq = DiscretisedFluidQueue::new(
        FluidQueue::new(phases),
        Mesh::dg_uniform(0.0, 3.0, 3, 3).unwrap(),
    );
    assert_eq!(dq.order(), 22);
    assert_zero_row_sums(&dq, "full-boundary DG");
}

#[test]
fn test_finite_volume_scheme() {
    // The FV scheme has no lazy form but still materialises, at the
    // smaller order-1 size.
    let mesh = Mesh::fv(vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
    let dq = DiscretisedFluidQueue::new(FluidQueue::new(three_phase_set()), mesh);

    assert!(build_lazy_generator(&dq).is_err());

    let full = build_full_generator(&dq).unwrap();
    assert_eq!(full.shape(), (2 + 3 * 4 + 2, 2 + 3 * 4 + 2));
    for (i, s) in full.row_sums().iter().enumerate() {
        assert!(s.abs() < ROW_SUM_TOL, "FV row {} sums to {}", i, s);
    }
}

#[test]
fn test_materialise_equals_both_identity_products() {
    use fluq_rs::CscMatrix;

    let mesh = Mesh::dg(vec![0.0, 1.0, 2.5], 2).unwrap();
    let dq = DiscretisedFluidQueue::new(FluidQueue::new(three_phase_set()), mesh);
    let lazy = build_lazy_generator(&dq).unwrap();
    let (m, _) = lazy.shape();

    let full = materialise(&lazy);
    let id = CscMatrix::identity(m);
    let left = lazy.mul_left_sparse(&id).unwrap().to_dense();
    let right = lazy.mul_right_sparse(&id).unwrap().to_dense();
    let direct = full.to_dense();

    for row in 0..m {
        for col in 0..m {
            assert!((direct[(row, col)] - left[(row, col)]).abs() < 1e-13);
            assert!((direct[(row, col)] - right[(row, col)]).abs() < 1e-13);
        }
    }
}
