pub mod branch_opt_util;
pub mod error;
pub mod gf128;
pub mod params;
pub mod permutation;
pub mod rng;
pub mod xor;
