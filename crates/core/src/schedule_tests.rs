// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rand::rngs::mock::StepRng;
use yare::parameterized;

fn rng() -> StepRng {
    // gen_range over a StepRng stuck at zero picks the range start
    StepRng::new(0, 0)
}

#[parameterized(
    short = { 3_600, 600 },          // < 6h: period / 6
    six_hours = { 21_600, 3_600 },   // boundary: one hour
    one_day = { 86_400, 3_600 },     // boundary: one hour
    long = { 172_800, 7_200 },       // > 24h: period / 24
)]
fn max_random_brackets(max_delay: u64, expected: u64) {
    assert_eq!(max_random(max_delay), expected);
}

#[test]
fn test_next_run_date_within_period() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let next = next_run_date(1_000_000, 3_600, &mut rng);
        assert!(next > 1_000_000 + 3_600 - 600);
        assert!(next <= 1_000_000 + 3_600);
    }
}

#[test]
fn test_next_run_date_zero_reduction_bound() {
    // max_delay below 6 keeps the reduction bound at zero
    let next = next_run_date(500, 5, &mut rng());
    assert_eq!(next, 505);
}

#[test]
fn test_initial_delay_within_half() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let delay = initial_delay(3_600, &mut rng);
        assert!(delay > 1_800);
        assert!(delay <= 3_600);
    }
}

#[test]
fn test_backoff_doubles_previous() {
    assert_eq!(backoff_delay(60, 0, 3_600, 3_600), 60);
    assert_eq!(backoff_delay(60, 60, 3_600, 3_600), 120);
    assert_eq!(backoff_delay(60, 120, 3_600, 3_600), 240);
}

#[test]
fn test_backoff_capped_by_both_ceilings() {
    assert_eq!(backoff_delay(60, 4_000, 3_600, 7_200), 3_600);
    assert_eq!(backoff_delay(60, 4_000, 7_200, 1_800), 1_800);
}
