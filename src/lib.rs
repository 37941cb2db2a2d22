//! pir_answer_engine: Server-side answer computation for two-server and preprocessing **P**rivate **I**nformation **R**etrieval (PIR).
//!
//! Given a database of fixed length rows and a compact query, this crate computes one server's answer share, without learning which
//! row the client is after. Three ways of combining database rows are supported.
//!
//! ## Features
//!
//! * **Puncturable-set PIR:** XOR of the rows addressed by a punctured set, evaluated by a pluggable puncturable-set library. See `punctured`.
//! * **Single-pass PIR:** Database split into equal chunks, each routed through its own seeded random permutation into parity blocks. See `single_pass`.
//! * **DPF-based PIR:** GF(2^128) inner product of an expanded distributed point function key with the database, with optional
//!   authentication of the reconstructed record. See `field`.
//! * **Deterministic:** Permutations are drawn from call-scoped ChaCha8 streams, so the same seed yields the same permutations on every
//!   party, and concurrent calls never interfere.
//! * **Error Handling:** Every input is validated before the first byte of output is written, failures are reported through `PIRError`.
//!
//! ## Usage
//!
//! Add it as dependency to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pir_answer_engine = "=0.1.0"
//! rand = "=0.9.0"
//! rand_chacha = "=0.9.0"
//! ```
//!
//! Then, you can use it in your code:
//!
//! ```rust
//! use pir_answer_engine::{PermutationSet, derive_permutation_seed, single_pass::{self, SinglePassParams}, SEED_BYTE_LEN};
//! use rand::prelude::*;
//! use rand_chacha::ChaCha8Rng;
//!
//! fn main() {
//!     let mut rng = ChaCha8Rng::from_os_rng();
//!
//!     // Database of 1024 rows, 32 bytes each, split into 16 chunks of 64 rows (replace with your own)
//!     let params = SinglePassParams::new(1024, 16, 32).expect("Invalid database shape");
//!     let mut db = vec![0u8; params.db_byte_len()];
//!     rng.fill_bytes(&mut db);
//!
//!     // Client and server agree on a seed
//!     let mut seed = [0u8; SEED_BYTE_LEN];
//!     rng.fill_bytes(&mut seed);
//!     let perm_seed = derive_permutation_seed(&seed);
//!
//!     // Server computes parities (offline phase)
//!     let mut perms = vec![0u32; params.db_num_elems()];
//!     let mut inv_perms = vec![0u32; params.db_num_elems()];
//!     let mut parities = vec![0u8; params.parity_byte_len()];
//!     single_pass::answer_single_pass(&db, &params, perm_seed, &mut perms, &mut inv_perms, &mut parities).expect("Failed to compute parities");
//!
//!     // Client regenerates the same permutations, and finds the parity slot holding row 5 of chunk 3
//!     let client_perms = PermutationSet::generate(perm_seed, params.set_num_elems(), params.perm_size()).expect("Failed to generate permutations");
//!     let (forward, _) = client_perms.chunk(3).expect("Chunk must exist");
//!
//!     let slot = 3 * params.perm_size() + forward[5] as usize;
//!     let row = 3 * params.perm_size() + 5;
//!     assert_eq!(parities[slot * 32..(slot + 1) * 32], db[row * 32..(row + 1) * 32]);
//! }
//! ```
//!
//! ## Modules
//!
//! * `punctured`: Puncturable-set evaluator interface and the `PuncturedSetResponder`, answering punctured set queries.
//! * `single_pass`: Permutation generation, parity computation and online answers of single-pass PIR.
//! * `field`: DPF interface, expanded key shares, and GF(2^128) answer combination.
//!
//! Building blocks (permutations, GF(2^128) arithmetic, row XOR aggregation) are re-exported at crate root.

pub use pir_internals::error::PIRError;
pub use pir_internals::gf128::{Block, gf128_mul, multiply_and_sum};
pub use pir_internals::params::{BLOCK_BYTE_LEN, DPF_SUPPORTED_NUM_POINTS, GF128_REDUCTION_POLYNOMIAL, SEED_BYTE_LEN};
pub use pir_internals::permutation::{Permutation, PermutationSet, generate_many, invert_permutation, permute};
pub use pir_internals::rng::{RandomStream, SeededStream, derive_permutation_seed};
pub use pir_internals::xor::{xor_all_rows, xor_hashes_by_bit_vector, xor_into, xor_row_at, xor_rows, xor_single_pass};

pub mod field;
pub mod punctured;
pub mod single_pass;

mod pir_internals;

mod test_pir;
