// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule arithmetic for target run dates.
//!
//! Pure functions over epoch seconds; the target keeps the state
//! (base run date, retry delay) and feeds it back in.

use rand::Rng;

const SIX_HOURS: u64 = 21_600;
const ONE_DAY: u64 = 86_400;
const ONE_HOUR: u64 = 3_600;

/// Upper bound of the random reduction applied to a run period.
///
/// Short periods spread over a sixth of the period, long ones over a
/// twenty-fourth, everything in between over one hour.
pub fn max_random(max_delay: u64) -> u64 {
    if max_delay < SIX_HOURS {
        max_delay / 6
    } else if max_delay > ONE_DAY {
        max_delay / 24
    } else {
        ONE_HOUR
    }
}

/// Next run date: one period after `timeref`, minus a random reduction.
pub fn next_run_date(timeref: u64, max_delay: u64, rng: &mut impl Rng) -> u64 {
    let reduction = match max_random(max_delay) {
        0 => 0,
        bound => rng.gen_range(0..bound),
    };
    timeref + max_delay - reduction
}

/// First-run delay with up to 50% random reduction.
pub fn initial_delay(delay: u64, rng: &mut impl Rng) -> u64 {
    let reduction = match delay / 2 {
        0 => 0,
        bound => rng.gen_range(0..bound),
    };
    delay - reduction
}

/// Retry delay after a failed run.
///
/// The first failure uses `requested` as-is; consecutive failures double
/// the previous delay. Always capped by both the target period and the
/// configured error ceiling.
pub fn backoff_delay(requested: u64, previous: u64, max_delay: u64, err_max_delay: u64) -> u64 {
    let delay = if previous > 0 { previous * 2 } else { requested };
    delay.min(max_delay).min(err_max_delay)
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
