//! Target-duration playlist selection. Candidates are shuffled
//! uniformly; randomness is the product requirement, not a heuristic
//! placeholder.

use rand::seq::SliceRandom;

/// Roughly one hour of music per spoken request.
pub const TARGET_SECONDS_DEFAULT: f64 = 3600.0;

/// Overshoot tolerance: once the running total reaches 85% of the
/// target, a candidate that would push it past 110% ends the walk.
/// Below 85% anything still fits, so a long album closer cannot leave
/// the playlist half-empty.
const NEAR_TARGET: f64 = 0.85;
const OVERSHOOT_CAP: f64 = 1.10;

/// Select an ordered subset of `(path, duration_secs)` candidates
/// whose summed duration approximates `target_seconds`. The returned
/// order is the (already random) walk order. Empty output means
/// nothing playable; callers must not dispatch it.
pub fn assemble(
    candidates: Vec<(String, f64)>,
    target_seconds: f64,
) -> (Vec<String>, f64) {
    let mut pool = candidates;
    let mut rng = rand::rng();
    pool.shuffle(&mut rng);

    let mut picked = Vec::new();
    let mut total = 0.0f64;

    for (path, duration) in pool {
        if !(duration > 0.0) {
            continue;
        }
        if total >= target_seconds {
            break;
        }
        if total >= target_seconds * NEAR_TARGET
            && total + duration > target_seconds * OVERSHOOT_CAP
        {
            break;
        }
        picked.push(path);
        total += duration;
    }

    (picked, total)
}
