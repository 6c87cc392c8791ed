use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::EnvFilter;

use ckks_engine::backend::sim::{self, Sim};
use ckks_engine::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine(seed: u64) -> Engine<Sim> {
    init_tracing();
    let sim_params = sim::params::compact().unwrap();
    let keys = sim::keygen(&sim_params, &mut ChaCha20Rng::seed_from_u64(seed)).unwrap();
    Engine::new(keys, ckks_engine::params::presets::compact().unwrap()).unwrap()
}

#[test]
fn polynomial_activation_approximates_exp() {
    let mut e = engine(100);
    let xs = [2.08, 0.57, 0.17, -0.90, 1.31, -0.25, 0.02, 1.76, -1.42, 0.88];
    let x = e.encrypt_at_level(&xs, 9).unwrap();
    let poly = Activation::Exp.polynomial::<Sim>().unwrap().unwrap();
    assert_eq!(poly.degree(), 7);
    let out = e.evaluate_degree_n(&x, &poly, xs.len(), true).unwrap();
    let dec = e.decrypt(&out).unwrap();
    for (i, &v) in xs.iter().enumerate() {
        assert!(
            (dec[i] - v.exp()).abs() < 0.5,
            "slot {i}: got {}, want {}",
            dec[i],
            v.exp()
        );
    }
}

#[test]
fn outer_product_of_constant_vectors() {
    let mut e = engine(101);
    let a = e.encrypt(&[2.0; 4]).unwrap();
    let b = e.encrypt(&[5.0; 4]).unwrap();
    let out = e.outer(&a, &b, 4, 4, true).unwrap();
    assert_eq!(out.len(), 4);
    for row in &out {
        let dec = e.decrypt(row).unwrap();
        for v in &dec[..4] {
            assert!((v - 10.0).abs() < 1e-2);
        }
    }
}

#[test]
fn bootstrap_preserves_values() {
    let mut e = engine(102);
    let vals = [0.25, -1.5, 3.0];
    let mut ct = e.encrypt_at_level(&vals, 1).unwrap();
    e.bootstrap(&mut ct).unwrap();
    assert_eq!(ct.level(), e.max_level());
    e.bootstrap(&mut ct).unwrap();
    let dec = e.decrypt(&ct).unwrap();
    for (g, w) in dec.iter().zip(vals) {
        assert!((g - w).abs() < 1e-2);
    }
}

#[test]
fn long_product_chain_is_refreshed() {
    let mut e = engine(103);
    let factor = e.encrypt(&[1.01]).unwrap();
    let mut acc = e.encrypt(&[1.0]).unwrap();
    for _ in 0..30 {
        e.multiply_assign(&mut acc, &factor, MulPolicy::AUTO).unwrap();
        assert!(acc.level() > e.params().bootstrap_threshold);
    }
    assert!(e.bootstrapper().unwrap().count() >= 2);
    let got = e.decrypt(&acc).unwrap()[0];
    assert!((got - 1.01f64.powi(30)).abs() < 1e-2);
}

#[test]
fn depth_exhaustion_without_bootstrap() {
    init_tracing();
    let sim_params = sim::params::compact().unwrap();
    let keys = sim::keygen(&sim_params, &mut ChaCha20Rng::seed_from_u64(104)).unwrap();
    let mut e = Engine::new(keys, ckks_engine::params::presets::no_bootstrap().unwrap()).unwrap();
    let two = e.encrypt(&[2.0]).unwrap();
    let mut acc = e.encrypt(&[1.0]).unwrap();
    for _ in 0..12 {
        e.multiply_assign(&mut acc, &two, MulPolicy::AUTO).unwrap();
    }
    assert_eq!(acc.level(), 0);
    assert!(matches!(
        e.multiply(&acc, &two, MulPolicy::AUTO),
        Err(EngineError::DepthExhausted { level: 0 })
    ));
}

#[test]
fn transpose_and_matrix_vector() {
    let mut e = engine(105);
    let m = [[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0], [9.0, 10.0, 11.0, 12.0]];
    let rows: Vec<_> = m.iter().map(|r| e.encrypt(r).unwrap()).collect();

    let cols = e.transpose(&rows, 4, true).unwrap();
    assert_eq!(cols.len(), 4);
    for (c, ct) in cols.iter().enumerate() {
        let dec = e.decrypt(ct).unwrap();
        for r in 0..3 {
            assert!((dec[r] - m[r][c]).abs() < 1e-2);
        }
        assert!(dec[3].abs() < 1e-2);
    }

    let v = e.encrypt(&[1.0, 0.0, -1.0, 0.5]).unwrap();
    let mv = e.matrix_vector(&rows, &v, true).unwrap();
    let dec = e.decrypt(&mv).unwrap();
    for r in 0..3 {
        let want = m[r][0] - m[r][2] + 0.5 * m[r][3];
        assert!((dec[r] - want).abs() < 1e-2);
    }
}

#[test]
fn missing_rotation_key_is_reported() {
    init_tracing();
    let sim_params = sim::params::compact().unwrap();
    let keys =
        sim::keygen_with_steps(&sim_params, &[2, 4], &mut ChaCha20Rng::seed_from_u64(106)).unwrap();
    let mut e = Engine::new(keys, ckks_engine::params::presets::compact().unwrap()).unwrap();
    let ct = e.encrypt(&[1.0, 2.0]).unwrap();
    assert!(matches!(
        e.sum_elements(&ct),
        Err(EngineError::RotationUnreachable { .. })
    ));
}
