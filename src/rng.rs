//! Thread-local RNG shared by the sampling paths.

use std::cell::UnsafeCell;

use rand::{rngs::OsRng, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

thread_local! {
    static FAST_RNG: UnsafeCell<Xoshiro256StarStar> = {
        UnsafeCell::new(Xoshiro256StarStar::try_from_rng(&mut OsRng).unwrap())
    };
}

fn with_rng<T>(f: impl FnOnce(&mut Xoshiro256StarStar) -> T) -> T {
    FAST_RNG.with(|rng| {
        // SAFETY: We know it's safe to take a mutable reference since we're getting a pointer to a
        // thread-local value, and the reference never outlives the closure executing on this thread.
        let rng = unsafe { &mut *rng.get() };
        f(rng)
    })
}

/// Uniform index in `0..upper`.  `upper` must be non-zero.
pub(crate) fn sample_index(upper: usize) -> usize {
    with_rng(|rng| rng.random_range(0..upper))
}

/// Bernoulli trial with probability `p` of returning `true`.  `p` must be within `[0, 1]`.
pub(crate) fn coin_flip(p: f64) -> bool {
    with_rng(|rng| rng.random_bool(p))
}
