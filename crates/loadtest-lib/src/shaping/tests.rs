//! Tests for the shaping models
//!
//! Seeded generators keep the statistical checks deterministic.

use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::time::Duration;

fn quiet_config() -> ShapeConfig {
    ShapeConfig {
        noise_range: 0.0,
        center_jitter: 0.0,
        ..Default::default()
    }
}

mod rate_tests {
    use super::*;

    #[test]
    fn test_rate_never_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = ShapeConfig {
            base_rate: 2.0,
            noise_range: 5.0,
            ..Default::default()
        };

        for minute in (-2880..4320).step_by(7) {
            let state = compute_rate(minute as f64, &config, &mut rng);
            assert!(state.rate >= 0.0, "negative rate at minute {minute}");
        }
    }

    #[test]
    fn test_noon_peak_without_noise() {
        let mut rng = StdRng::seed_from_u64(1);
        let state = compute_rate(720.0, &quiet_config(), &mut rng);

        // The evening peak contributes 0.5 * exp(-4.5) * 30 ≈ 0.17 at noon
        assert!((state.rate - 80.0).abs() < 0.5, "rate was {}", state.rate);
        assert!((state.wait_time.as_secs_f64() - 60.0 / state.rate).abs() < 1e-9);
    }

    #[test]
    fn test_midnight_is_base_rate_within_noise_band() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = ShapeConfig::default();

        for _ in 0..1000 {
            let state = compute_rate(0.0, &config, &mut rng);
            assert!(
                (44.99..=55.01).contains(&state.rate),
                "rate {} outside noise band",
                state.rate
            );
        }
    }

    #[test]
    fn test_minute_of_day_wraps() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = quiet_config();

        let today = compute_rate(720.0, &config, &mut rng);
        let tomorrow = compute_rate(720.0 + MINUTES_PER_DAY, &config, &mut rng);
        let yesterday = compute_rate(720.0 - MINUTES_PER_DAY, &config, &mut rng);

        assert!((today.rate - tomorrow.rate).abs() < 1e-9);
        assert!((today.rate - yesterday.rate).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rate_uses_fallback_wait() {
        let mut rng = StdRng::seed_from_u64(9);
        let config = ShapeConfig {
            base_rate: -100.0,
            ..quiet_config()
        };

        let state = compute_rate(0.0, &config, &mut rng);
        assert_eq!(state.rate, 0.0);
        assert_eq!(state.wait_time, Duration::from_secs(60));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let config = ShapeConfig::default();
        let mut a = RateShaper::new(config.clone(), StdRng::seed_from_u64(11)).unwrap();
        let mut b = RateShaper::new(config, StdRng::seed_from_u64(11)).unwrap();

        for minute in 0..200 {
            assert_eq!(a.at_minute(minute as f64 * 7.0), b.at_minute(minute as f64 * 7.0));
        }
    }

    #[test]
    fn test_jitter_resampled_per_call() {
        let config = ShapeConfig {
            noise_range: 0.0,
            ..Default::default()
        };
        let mut shaper = RateShaper::new(config, StdRng::seed_from_u64(5)).unwrap();

        // On the flank of the noon peak a shifted center changes the rate
        let rates: Vec<f64> = (0..20).map(|_| shaper.at_minute(600.0).rate).collect();
        let distinct = rates
            .windows(2)
            .filter(|w| (w[0] - w[1]).abs() > 1e-9)
            .count();
        assert!(distinct > 0, "jitter never changed the rate");
    }

    #[test]
    fn test_time_scale_is_not_truncated() {
        let config = ShapeConfig {
            total_run_time: Duration::from_secs(7000),
            ..Default::default()
        };

        // 86400 / 7000 = 12.342857..., integer division would give 12
        assert!((config.time_scale() - 12.342_857_142_857).abs() < 1e-9);
        let minutes = config.simulated_minutes(Duration::from_secs(7000));
        assert!((minutes - MINUTES_PER_DAY).abs() < 1e-6);
    }

    #[test]
    fn test_at_elapsed_compresses_day() {
        let config = ShapeConfig {
            total_run_time: Duration::from_secs(600),
            ..quiet_config()
        };
        let mut shaper = RateShaper::new(config, StdRng::seed_from_u64(0)).unwrap();

        // Halfway through a ten minute run is simulated noon
        let state = shaper.at_elapsed(Duration::from_secs(300));
        assert!((state.rate - 80.0).abs() < 0.5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ShapeConfig {
            peak_width: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ShapeError::InvalidParameter { name: "peak_width", .. })
        ));

        let config = ShapeConfig {
            total_run_time: Duration::ZERO,
            ..Default::default()
        };
        assert!(RateShaper::new(config, StdRng::seed_from_u64(0)).is_err());
    }
}

mod user_shape_tests {
    use super::*;

    #[test]
    fn test_tick_ends_after_run_time() {
        let config = ShapeConfig {
            total_run_time: Duration::from_secs(60),
            ..Default::default()
        };
        let shape = UserShape::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert!(shape.tick(Duration::from_secs(60), &mut rng).is_some());
        assert!(shape.tick(Duration::from_secs(61), &mut rng).is_none());
    }

    #[test]
    fn test_spawn_rate_matches_user_count() {
        let shape = UserShape::new(ShapeConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(2);

        let tick = shape.tick(Duration::from_secs(43_200), &mut rng).unwrap();
        assert_eq!(tick.spawn_rate, f64::from(tick.user_count));
        // Noon: 50 + 30 * (1 + small) ± 5
        assert!((75..=85).contains(&tick.user_count));
    }

    #[test]
    fn test_user_count_clamped_at_zero() {
        let config = ShapeConfig {
            base_users: -500.0,
            ..Default::default()
        };
        let shape = UserShape::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let tick = shape.tick(Duration::ZERO, &mut rng).unwrap();
        assert_eq!(tick.user_count, 0);
    }

    #[test]
    fn test_series_covers_whole_run() {
        let config = ShapeConfig {
            total_run_time: Duration::from_secs(600),
            ..Default::default()
        };
        let shape = UserShape::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        let series = shape.series(Duration::from_secs(60), &mut rng);
        assert_eq!(series.len(), 11);
        assert_eq!(series.last().unwrap().0, Duration::from_secs(600));
    }
}

mod selector_tests {
    use super::*;

    #[test]
    fn test_default_probabilities_sum_to_one() {
        let table = EndpointWeightTable::default();
        let sum: f64 = table.probabilities().iter().map(|(_, p)| p).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(table.total_weight(), 19);
    }

    #[test]
    fn test_selection_frequencies_converge() {
        let table = EndpointWeightTable::default();
        let selector = EndpointSelector::new(&table).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);

        const TRIALS: usize = 100_000;
        let mut counts: HashMap<Operation, usize> = HashMap::new();
        for _ in 0..TRIALS {
            *counts.entry(selector.select(&mut rng)).or_default() += 1;
        }

        let expected = [
            (Operation::Index, 0.053),
            (Operation::SetCurrency, 0.105),
            (Operation::BrowseProduct, 0.526),
            (Operation::AddToCart, 0.105),
            (Operation::ViewCart, 0.158),
            (Operation::Checkout, 0.053),
        ];
        for (op, p) in expected {
            let observed = counts.get(&op).copied().unwrap_or(0) as f64 / TRIALS as f64;
            assert!(
                (observed - p).abs() < 0.01,
                "{op}: observed {observed:.4}, expected {p:.3}"
            );
        }
        assert!(!counts.contains_key(&Operation::Logout));
    }

    #[test]
    fn test_zero_weight_rejected() {
        let result = EndpointWeightTable::new(vec![(Operation::Index, 1), (Operation::Logout, 0)]);
        assert_eq!(result, Err(ShapeError::ZeroWeight(Operation::Logout)));
    }

    #[test]
    fn test_empty_and_duplicate_rejected() {
        assert_eq!(
            EndpointWeightTable::new(vec![]),
            Err(ShapeError::EmptyWeightTable)
        );
        assert_eq!(
            EndpointWeightTable::new(vec![(Operation::Index, 1), (Operation::Index, 2)]),
            Err(ShapeError::DuplicateOperation(Operation::Index))
        );
    }

    #[test]
    fn test_parse_weight_table() {
        let table: EndpointWeightTable = "index=1, browseProduct=10,logout=2".parse().unwrap();
        assert_eq!(
            table.entries(),
            &[
                (Operation::Index, 1),
                (Operation::BrowseProduct, 10),
                (Operation::Logout, 2)
            ]
        );

        assert!(matches!(
            "index".parse::<EndpointWeightTable>(),
            Err(ShapeError::MalformedWeight(_))
        ));
        assert!(matches!(
            "teleport=3".parse::<EndpointWeightTable>(),
            Err(ShapeError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_single_operation_always_selected() {
        let table = EndpointWeightTable::new(vec![(Operation::ViewCart, 5)]).unwrap();
        let selector = EndpointSelector::new(&table).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for _ in 0..100 {
            assert_eq!(selector.select(&mut rng), Operation::ViewCart);
        }
    }
}
