// Everything pseudo-random in Swirl goes through here: pointer colors, click
// jitter and splat bursts.
//
// Seeding the generator makes a session reproducible, which the tests rely on.

use rand::distr::{Alphanumeric, StandardUniform};
use rand::prelude::*;
use rand_pcg::Pcg32;
use rand_seeder::Seeder;
use std::cell::RefCell;
use std::thread_local;

thread_local!(
    static SWIRL_RNG: RefCell<Pcg32> = {
        let rng = Pcg32::from_rng(&mut rand::rng());
        RefCell::new(rng)
    }
);

pub fn init_from_seed(optional_seed: &Option<String>) {
    let seed = optional_seed.as_ref().cloned().unwrap_or_else(|| {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    });

    SWIRL_RNG.with(|rng| rng.replace(Seeder::from(seed).into_rng()));
}

pub fn gen<T>() -> T
where
    StandardUniform: Distribution<T>,
{
    SWIRL_RNG.with(|rng| rng.borrow_mut().random::<T>())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_seed_gives_same_sequence() {
        let seed = Some("swirl".to_string());

        init_from_seed(&seed);
        let first: Vec<f32> = (0..8).map(|_| gen()).collect();

        init_from_seed(&seed);
        let second: Vec<f32> = (0..8).map(|_| gen()).collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|v| (0.0..1.0).contains(v)));
    }
}
