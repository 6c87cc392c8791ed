use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use ckks_engine::backend::sim::{self, Sim};
use ckks_engine::engine::rotate::{find_step, rotation_steps};
use ckks_engine::prelude::*;

fn engine(seed: u64) -> Engine<Sim> {
    let sim_params = sim::params::compact().unwrap();
    let keys = sim::keygen(&sim_params, &mut ChaCha20Rng::seed_from_u64(seed)).unwrap();
    Engine::new(keys, ckks_engine::params::presets::compact().unwrap()).unwrap()
}

#[test]
fn find_step_covers_half_range() {
    for slots in [16usize, 64, 1024] {
        let steps = rotation_steps(slots);
        let half = slots as i64 / 2;
        for k in -half..=half {
            let path = find_step(k, slots, &steps).unwrap();
            assert_eq!(path.iter().sum::<i64>(), k, "slots {slots}, k {k}");
            assert!(path.iter().all(|s| steps.contains(s)));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_find_step_congruent(k in -100_000i64..100_000, log_slots in 1u32..11) {
        let slots = 1usize << log_slots;
        let path = find_step(k, slots, &rotation_steps(slots)).unwrap();
        let total: i64 = path.iter().sum();
        prop_assert_eq!((total - k).rem_euclid(slots as i64), 0);
        prop_assert!(total.abs() <= slots as i64 / 2);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_sum_elements(values in prop::collection::vec(-10.0f64..10.0, 1..64), seed in any::<u64>()) {
        let mut e = engine(seed);
        let want: f64 = values.iter().sum();
        let ct = e.encrypt(&values).unwrap();
        let sum = e.sum_elements(&ct).unwrap();
        prop_assert_eq!(sum.level(), ct.level());
        let dec = e.decrypt(&sum).unwrap();
        prop_assert!((dec[0] - want).abs() < 1e-2);
        prop_assert!((dec[63] - want).abs() < 1e-2);
    }

    #[test]
    fn prop_rescaling_multiply_burns_one_level(
        a in -4.0f64..4.0,
        b in -4.0f64..4.0,
        level in 2usize..=12,
        seed in any::<u64>(),
    ) {
        let mut e = engine(seed);
        let x = e.encrypt_at_level(&[a], level).unwrap();
        let y = e.encrypt_at_level(&[b], level).unwrap();
        let p = e.multiply(&x, &y, MulPolicy::RESCALE).unwrap();
        prop_assert_eq!(p.level(), level - 1);
        prop_assert!((p.scale() / e.target_scale() - 1.0).abs() < 1e-3);
        prop_assert!((e.decrypt(&p).unwrap()[0] - a * b).abs() < 1e-3);
    }

    #[test]
    fn prop_add_reconciles_level_and_scale(
        a in -50.0f64..50.0,
        b in -50.0f64..50.0,
        drop in 0usize..8,
        seed in any::<u64>(),
    ) {
        let mut e = engine(seed);
        let one = e.encrypt(&[1.0]).unwrap();
        let x = e.encrypt(&[a]).unwrap();
        // Rescaled product: different scale and one level lower.
        let x = e.multiply(&x, &one, MulPolicy::RESCALE).unwrap();
        let y = e.encrypt_at_level(&[b], 12 - drop).unwrap();
        let s = e.add(&x, &y).unwrap();
        prop_assert_eq!(s.level(), x.level().min(y.level()));
        prop_assert!((e.decrypt(&s).unwrap()[0] - (a + b)).abs() < 1e-3);
    }

    #[test]
    fn prop_concurrent_matches_sequential(
        values in prop::collection::vec(-2.0f64..2.0, 2..10),
        seed in any::<u64>(),
    ) {
        let mut e = engine(seed);
        let a: Vec<_> = values.iter().map(|v| e.encrypt(&[*v]).unwrap()).collect();
        let b: Vec<_> = values.iter().map(|v| e.encrypt(&[v * 0.5]).unwrap()).collect();
        let seq = e.inter_dot_product(&a, &b, false).unwrap();
        let par = e.inter_dot_product(&a, &b, true).unwrap();
        let s = e.decrypt(&seq).unwrap()[0];
        let p = e.decrypt(&par).unwrap()[0];
        prop_assert!((s - p).abs() < 1e-1);
    }
}
