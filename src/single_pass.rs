//! Single-pass, permutation-network based preprocessing PIR.
//!
//! Database of `db_num_elems` rows is split into `set_num_elems` contiguous chunks of `perm_size` rows each. Every chunk gets its
//! own random permutation of `[0, perm_size)`, all of them drawn in sequence from one stream seeded by a 64 -bit seed, which client
//! and server share. During the offline phase, server routes chunk rows to parity slots through the inverse permutations. During
//! the online phase, it returns one row out of every chunk.

use crate::pir_internals::{branch_opt_util, error::PIRError, permutation, xor};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Validated shape of a single-pass PIR database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinglePassParams {
    db_num_elems: usize,
    set_num_elems: usize,
    db_elem_size: usize,
}

/// Number of rows per chunk, if `db_num_elems` rows can be split into `set_num_elems` equal chunks.
fn chunk_size(db_num_elems: usize, set_num_elems: usize) -> Result<usize, PIRError> {
    if branch_opt_util::unlikely(set_num_elems == 0) {
        return Err(PIRError::InvalidNumberOfSets);
    }
    if branch_opt_util::unlikely(db_num_elems % set_num_elems != 0) {
        return Err(PIRError::DatabaseNotDivisibleIntoChunks { db_num_elems, set_num_elems });
    }

    let perm_size = db_num_elems / set_num_elems;
    if branch_opt_util::unlikely(perm_size > u32::MAX as usize) {
        return Err(PIRError::PermutationSizeTooLarge(perm_size));
    }

    Ok(perm_size)
}

impl SinglePassParams {
    /// Validates database shape.
    ///
    /// # Arguments
    ///
    /// * `db_num_elems` - Number of rows in the database.
    /// * `set_num_elems` - Number of chunks, must be non-zero and divide `db_num_elems`.
    /// * `db_elem_size` - Byte length of one row, must be non-zero.
    ///
    /// # Returns
    ///
    /// * `Result<SinglePassParams, PIRError>` - Returns an error if any requirement above is violated, or if the database byte length
    ///   doesn't fit in `usize`.
    pub fn new(db_num_elems: usize, set_num_elems: usize, db_elem_size: usize) -> Result<SinglePassParams, PIRError> {
        if branch_opt_util::unlikely(db_elem_size == 0) {
            return Err(PIRError::InvalidElementByteLength);
        }

        chunk_size(db_num_elems, set_num_elems)?;
        db_num_elems.checked_mul(db_elem_size).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;

        Ok(SinglePassParams {
            db_num_elems,
            set_num_elems,
            db_elem_size,
        })
    }

    #[inline(always)]
    pub const fn db_num_elems(&self) -> usize {
        self.db_num_elems
    }
    #[inline(always)]
    pub const fn set_num_elems(&self) -> usize {
        self.set_num_elems
    }
    #[inline(always)]
    pub const fn db_elem_size(&self) -> usize {
        self.db_elem_size
    }

    /// Number of rows in each chunk, also the size of each permutation.
    #[inline(always)]
    pub const fn perm_size(&self) -> usize {
        self.db_num_elems / self.set_num_elems
    }

    /// Number of parity blocks produced by `answer_single_pass`, one per slot per chunk.
    #[inline(always)]
    pub const fn num_parities(&self) -> usize {
        self.set_num_elems * self.perm_size()
    }

    #[inline(always)]
    pub const fn db_byte_len(&self) -> usize {
        self.db_num_elems * self.db_elem_size
    }

    /// Byte length of the parity buffer filled by `answer_single_pass`.
    #[inline(always)]
    pub const fn parity_byte_len(&self) -> usize {
        self.num_parities() * self.db_elem_size
    }

    /// Byte length of the parity buffer filled by `answer_single_pass_folded`.
    #[inline(always)]
    pub const fn folded_parity_byte_len(&self) -> usize {
        self.perm_size() * self.db_elem_size
    }

    /// Byte length of the answer written by `answer_query`, one row per chunk.
    #[inline(always)]
    pub const fn answer_byte_len(&self) -> usize {
        self.set_num_elems * self.db_elem_size
    }
}

#[inline(always)]
fn expect_len(actual: usize, expected: usize) -> Result<(), PIRError> {
    if branch_opt_util::likely(actual == expected) {
        Ok(())
    } else {
        Err(PIRError::UnexpectedBufferLength { expected, actual })
    }
}

/// Draws `set_num_elems` permutations of `[0, db_num_elems / set_num_elems)` from a stream seeded with `seed`, writing them and
/// their inverses into `permutations` and `inverse_permutations`, concatenated in chunk order. Both buffers must hold exactly
/// `db_num_elems` entries.
pub fn generate_permutations(
    db_num_elems: usize,
    set_num_elems: usize,
    seed: u64,
    permutations: &mut [u32],
    inverse_permutations: &mut [u32],
) -> Result<(), PIRError> {
    let perm_size = chunk_size(db_num_elems, set_num_elems)?;
    permutation::generate_many(seed, set_num_elems, perm_size, permutations, inverse_permutations)
}

/// Common validation of offline phase inputs, followed by permutation regeneration into caller's scratch buffers.
fn prepare_offline_phase(
    db: &[u8],
    params: &SinglePassParams,
    seed: u64,
    permutations: &mut [u32],
    inverse_permutations: &mut [u32],
    parities_len: usize,
    expected_parities_len: usize,
) -> Result<(), PIRError> {
    if branch_opt_util::unlikely(db.len() < params.db_byte_len()) {
        return Err(PIRError::UnexpectedBufferLength {
            expected: params.db_byte_len(),
            actual: db.len(),
        });
    }
    expect_len(parities_len, expected_parities_len)?;

    generate_permutations(params.db_num_elems(), params.set_num_elems(), seed, permutations, inverse_permutations)
}

/// Offline phase of single-pass PIR: computes one parity block per slot per chunk.
///
/// Permutations are regenerated from `seed` into `permutations` and `inverse_permutations` (each `db_num_elems` entries long),
/// whatever they held before, and may be discarded by the caller afterwards. `parities` must be `params.parity_byte_len()` bytes
/// long and is overwritten: parity block `c * perm_size + p` equals row `c * perm_size + inverse_c[p]` of `db`.
///
/// With the `parallel` feature enabled, chunks are processed on the rayon thread pool. Result doesn't change.
pub fn answer_single_pass(
    db: &[u8],
    params: &SinglePassParams,
    seed: u64,
    permutations: &mut [u32],
    inverse_permutations: &mut [u32],
    parities: &mut [u8],
) -> Result<(), PIRError> {
    tracing::debug!(
        db_num_elems = params.db_num_elems(),
        set_num_elems = params.set_num_elems(),
        db_elem_size = params.db_elem_size(),
        "Computing single-pass parities"
    );

    prepare_offline_phase(db, params, seed, permutations, inverse_permutations, parities.len(), params.parity_byte_len())
        .inspect_err(|e| tracing::warn!(error = %e, "Failed to compute single-pass parities"))?;

    let perm_size = params.perm_size();
    if branch_opt_util::unlikely(perm_size == 0) {
        return Ok(());
    }

    let elem_size = params.db_elem_size();
    let chunk_byte_len = perm_size * elem_size;
    let db = &db[..params.db_byte_len()];

    parities.fill(0);

    #[cfg(not(feature = "parallel"))]
    parities
        .chunks_exact_mut(chunk_byte_len)
        .zip(db.chunks_exact(chunk_byte_len))
        .zip(inverse_permutations.chunks_exact(perm_size))
        .try_for_each(|((chunk_parities, db_chunk), inverse)| xor::xor_single_pass(db_chunk, inverse, chunk_parities, elem_size))?;

    #[cfg(feature = "parallel")]
    parities
        .par_chunks_exact_mut(chunk_byte_len)
        .zip(db.par_chunks_exact(chunk_byte_len))
        .zip(inverse_permutations.par_chunks_exact(perm_size))
        .try_for_each(|((chunk_parities, db_chunk), inverse)| xor::xor_single_pass(db_chunk, inverse, chunk_parities, elem_size))?;

    Ok(())
}

/// Offline phase of single-pass PIR, producing the compact hint: `perm_size` parity blocks, where block `p` is the XOR, over all
/// chunks `c`, of row `c * perm_size + inverse_c[p]`. Equals XOR of the per-chunk parity slices filled by `answer_single_pass`.
///
/// `parities` must be `params.folded_parity_byte_len()` bytes long. Permutation buffers are handled as in `answer_single_pass`.
pub fn answer_single_pass_folded(
    db: &[u8],
    params: &SinglePassParams,
    seed: u64,
    permutations: &mut [u32],
    inverse_permutations: &mut [u32],
    parities: &mut [u8],
) -> Result<(), PIRError> {
    tracing::debug!(
        db_num_elems = params.db_num_elems(),
        set_num_elems = params.set_num_elems(),
        db_elem_size = params.db_elem_size(),
        "Computing folded single-pass parities"
    );

    prepare_offline_phase(db, params, seed, permutations, inverse_permutations, parities.len(), params.folded_parity_byte_len())
        .inspect_err(|e| tracing::warn!(error = %e, "Failed to compute folded single-pass parities"))?;

    let perm_size = params.perm_size();
    if branch_opt_util::unlikely(perm_size == 0) {
        return Ok(());
    }

    let elem_size = params.db_elem_size();
    let chunk_byte_len = perm_size * elem_size;
    let db = &db[..params.db_byte_len()];

    parities.fill(0);

    #[cfg(not(feature = "parallel"))]
    db.chunks_exact(chunk_byte_len)
        .zip(inverse_permutations.chunks_exact(perm_size))
        .try_for_each(|(db_chunk, inverse)| xor::xor_single_pass(db_chunk, inverse, parities, elem_size))?;

    #[cfg(feature = "parallel")]
    {
        let inverse_permutations = &*inverse_permutations;

        parities.par_chunks_exact_mut(elem_size).enumerate().try_for_each(|(slot, parity)| {
            db.chunks_exact(chunk_byte_len)
                .zip(inverse_permutations.chunks_exact(perm_size))
                .try_for_each(|(db_chunk, inverse)| xor::xor_row_at(db_chunk, inverse[slot] as usize, elem_size, parity))
        })?;
    }

    Ok(())
}

/// Online phase of single-pass PIR: for every chunk `i`, copies row `i * perm_size + indices[i]` of `db` into slot `i` of `out`.
///
/// `indices` must hold one in-chunk index per chunk, each below `perm_size`, and `out` must be `params.answer_byte_len()` bytes
/// long. All indices are validated before `out` is written.
pub fn answer_query(db: &[u8], params: &SinglePassParams, indices: &[u32], out: &mut [u8]) -> Result<(), PIRError> {
    tracing::debug!(set_num_elems = params.set_num_elems(), db_elem_size = params.db_elem_size(), "Answering single-pass query");

    let validate = || -> Result<(), PIRError> {
        if branch_opt_util::unlikely(db.len() < params.db_byte_len()) {
            return Err(PIRError::UnexpectedBufferLength {
                expected: params.db_byte_len(),
                actual: db.len(),
            });
        }
        expect_len(indices.len(), params.set_num_elems())?;
        expect_len(out.len(), params.answer_byte_len())?;

        let perm_size = params.perm_size();
        if let Some(&index) = indices.iter().find(|&&index| index as usize >= perm_size) {
            return Err(PIRError::RowIndexOutOfBounds {
                index: index as usize,
                num_rows: perm_size,
            });
        }

        Ok(())
    };
    validate().inspect_err(|e| tracing::warn!(error = %e, "Failed to answer single-pass query"))?;

    let perm_size = params.perm_size();
    let elem_size = params.db_elem_size();
    let db = &db[..params.db_byte_len()];

    out.fill(0);
    out.chunks_exact_mut(elem_size)
        .zip(indices)
        .enumerate()
        .try_for_each(|(chunk_idx, (slot, &index))| xor::xor_row_at(db, chunk_idx * perm_size + index as usize, elem_size, slot))
}

#[cfg(test)]
mod test {
    use super::{SinglePassParams, answer_query, answer_single_pass, answer_single_pass_folded, generate_permutations};
    use crate::pir_internals::{error::PIRError, permutation::PermutationSet};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn random_db(rng: &mut ChaCha8Rng, params: &SinglePassParams) -> Vec<u8> {
        let mut db = vec![0u8; params.db_byte_len()];
        rng.fill_bytes(&mut db);
        db
    }

    #[test_case(32, 4, 16 => matches Ok(_); "Evenly divisible database is accepted")]
    #[test_case(0, 4, 16 => matches Ok(_); "Empty database is accepted")]
    #[test_case(30, 4, 16 => matches Err(PIRError::DatabaseNotDivisibleIntoChunks { db_num_elems: 30, set_num_elems: 4 }); "Uneven chunks are rejected")]
    #[test_case(32, 0, 16 => matches Err(PIRError::InvalidNumberOfSets); "Number of chunks must be non-zero")]
    #[test_case(32, 4, 0 => matches Err(PIRError::InvalidElementByteLength); "Rows must be non-empty")]
    #[test_case(usize::MAX, 1, 2 => matches Err(PIRError::PermutationSizeTooLarge(_)); "Chunks must be indexable with 32 -bit entries")]
    fn params_are_validated(db_num_elems: usize, set_num_elems: usize, db_elem_size: usize) -> Result<SinglePassParams, PIRError> {
        SinglePassParams::new(db_num_elems, set_num_elems, db_elem_size)
    }

    #[test]
    fn params_report_buffer_sizes() {
        let params = SinglePassParams::new(32, 4, 16).expect("Params must be valid");

        assert_eq!(params.perm_size(), 8);
        assert_eq!(params.num_parities(), 32);
        assert_eq!(params.db_byte_len(), 512);
        assert_eq!(params.parity_byte_len(), 512);
        assert_eq!(params.folded_parity_byte_len(), 128);
        assert_eq!(params.answer_byte_len(), 64);
    }

    #[test]
    fn generated_permutations_match_permutation_set() {
        const SEED: u64 = 42;

        let mut perms = vec![0u32; 32];
        let mut invs = vec![0u32; 32];
        generate_permutations(32, 4, SEED, &mut perms, &mut invs).expect("Permutations must be generated");

        let set = PermutationSet::generate(SEED, 4, 8).expect("Permutations must be generated");
        assert_eq!(perms, set.forward());
        assert_eq!(invs, set.inverse());
    }

    #[test]
    fn parity_slot_holds_row_routed_by_inverse_permutation() {
        const SEED: u64 = 42;

        let mut rng = ChaCha8Rng::from_os_rng();
        let params = SinglePassParams::new(32, 4, 16).expect("Params must be valid");
        let db = random_db(&mut rng, &params);

        let mut perms = vec![0u32; params.db_num_elems()];
        let mut invs = vec![0u32; params.db_num_elems()];
        generate_permutations(32, 4, SEED, &mut perms, &mut invs).expect("Permutations must be generated");

        let expected_invs = invs.clone();

        let mut parities = vec![0u8; params.parity_byte_len()];
        answer_single_pass(&db, &params, SEED, &mut perms, &mut invs, &mut parities).expect("Parities must be computed");

        assert_eq!(invs, expected_invs);

        let (perm_size, elem_size) = (params.perm_size(), params.db_elem_size());
        for chunk_idx in 0..params.set_num_elems() {
            for slot in 0..perm_size {
                let parity_idx = chunk_idx * perm_size + slot;
                let row_idx = chunk_idx * perm_size + expected_invs[parity_idx] as usize;

                assert_eq!(
                    parities[parity_idx * elem_size..(parity_idx + 1) * elem_size],
                    db[row_idx * elem_size..(row_idx + 1) * elem_size]
                );
            }
        }
    }

    #[test]
    fn caller_supplied_permutations_are_overwritten() {
        const SEED: u64 = 7;

        let mut rng = ChaCha8Rng::from_os_rng();
        let params = SinglePassParams::new(64, 8, 8).expect("Params must be valid");
        let db = random_db(&mut rng, &params);

        let mut fresh_perms = vec![0u32; params.db_num_elems()];
        let mut fresh_invs = vec![0u32; params.db_num_elems()];
        let mut fresh_parities = vec![0u8; params.parity_byte_len()];
        answer_single_pass(&db, &params, SEED, &mut fresh_perms, &mut fresh_invs, &mut fresh_parities).expect("Parities must be computed");

        let mut garbage_perms = vec![u32::MAX; params.db_num_elems()];
        let mut garbage_invs = vec![3u32; params.db_num_elems()];
        let mut stale_parities = vec![0xffu8; params.parity_byte_len()];
        answer_single_pass(&db, &params, SEED, &mut garbage_perms, &mut garbage_invs, &mut stale_parities).expect("Parities must be computed");

        assert_eq!(garbage_perms, fresh_perms);
        assert_eq!(garbage_invs, fresh_invs);
        assert_eq!(stale_parities, fresh_parities);
    }

    #[test]
    fn folded_parities_equal_xor_of_chunk_parities() {
        const SEED: u64 = 1337;

        let mut rng = ChaCha8Rng::from_os_rng();
        let params = SinglePassParams::new(96, 6, 20).expect("Params must be valid");
        let db = random_db(&mut rng, &params);

        let mut perms = vec![0u32; params.db_num_elems()];
        let mut invs = vec![0u32; params.db_num_elems()];

        let mut parities = vec![0u8; params.parity_byte_len()];
        answer_single_pass(&db, &params, SEED, &mut perms, &mut invs, &mut parities).expect("Parities must be computed");

        let mut folded = vec![0u8; params.folded_parity_byte_len()];
        answer_single_pass_folded(&db, &params, SEED, &mut perms, &mut invs, &mut folded).expect("Parities must be computed");

        let expected = parities.chunks_exact(params.folded_parity_byte_len()).fold(vec![0u8; params.folded_parity_byte_len()], |mut acc, chunk| {
            acc.iter_mut().zip(chunk).for_each(|(a, &b)| *a ^= b);
            acc
        });

        assert_eq!(folded, expected);
    }

    #[test]
    fn different_seeds_yield_different_parities() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let params = SinglePassParams::new(1024, 4, 32).expect("Params must be valid");
        let db = random_db(&mut rng, &params);

        let mut perms = vec![0u32; params.db_num_elems()];
        let mut invs = vec![0u32; params.db_num_elems()];

        let mut parities_a = vec![0u8; params.parity_byte_len()];
        answer_single_pass(&db, &params, 1, &mut perms, &mut invs, &mut parities_a).expect("Parities must be computed");

        let mut parities_b = vec![0u8; params.parity_byte_len()];
        answer_single_pass(&db, &params, 2, &mut perms, &mut invs, &mut parities_b).expect("Parities must be computed");

        assert_ne!(parities_a, parities_b);
    }

    #[test_case(512, 32, 32, 512 => matches Ok(_); "Exactly sized buffers are accepted")]
    #[test_case(511, 32, 32, 512 => matches Err(PIRError::UnexpectedBufferLength { expected: 512, actual: 511 }); "Short database is rejected")]
    #[test_case(512, 31, 32, 512 => matches Err(PIRError::UnexpectedBufferLength { expected: 32, actual: 31 }); "Short permutation buffer is rejected")]
    #[test_case(512, 32, 33, 512 => matches Err(PIRError::UnexpectedBufferLength { expected: 32, actual: 33 }); "Long inverse permutation buffer is rejected")]
    #[test_case(512, 32, 32, 128 => matches Err(PIRError::UnexpectedBufferLength { expected: 512, actual: 128 }); "Parity buffer must hold every chunk")]
    fn single_pass_validates_buffers(db_len: usize, perms_len: usize, invs_len: usize, parities_len: usize) -> Result<(), PIRError> {
        let params = SinglePassParams::new(32, 4, 16).expect("Params must be valid");

        let db = vec![0u8; db_len];
        let mut perms = vec![0u32; perms_len];
        let mut invs = vec![0u32; invs_len];
        let mut parities = vec![0u8; parities_len];

        answer_single_pass(&db, &params, 42, &mut perms, &mut invs, &mut parities)
    }

    #[test]
    fn empty_database_yields_no_parities() {
        let params = SinglePassParams::new(0, 4, 16).expect("Params must be valid");

        let mut parities = Vec::<u8>::new();
        answer_single_pass(&[], &params, 42, &mut [], &mut [], &mut parities).expect("Nothing to compute");
        answer_single_pass_folded(&[], &params, 42, &mut [], &mut [], &mut parities).expect("Nothing to compute");
    }

    #[test]
    fn query_answer_copies_one_row_per_chunk() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let params = SinglePassParams::new(40, 5, 12).expect("Params must be valid");
        let db = random_db(&mut rng, &params);

        let indices = (0..params.set_num_elems()).map(|_| rng.random_range(0..params.perm_size() as u32)).collect::<Vec<u32>>();

        let mut out = vec![0xa5u8; params.answer_byte_len()];
        answer_query(&db, &params, &indices, &mut out).expect("Query must be answered");

        let elem_size = params.db_elem_size();
        for (chunk_idx, &index) in indices.iter().enumerate() {
            let row_idx = chunk_idx * params.perm_size() + index as usize;
            assert_eq!(out[chunk_idx * elem_size..(chunk_idx + 1) * elem_size], db[row_idx * elem_size..(row_idx + 1) * elem_size]);
        }
    }

    #[test_case(&[0, 7, 3, 1] => matches Ok(_); "In-chunk indices are accepted")]
    #[test_case(&[0, 8, 3, 1] => matches Err(PIRError::RowIndexOutOfBounds { index: 8, num_rows: 8 }); "Index past chunk end is rejected")]
    #[test_case(&[0, 7, 3] => matches Err(PIRError::UnexpectedBufferLength { expected: 4, actual: 3 }); "One index per chunk is required")]
    fn query_indices_are_validated(indices: &[u32]) -> Result<(), PIRError> {
        let params = SinglePassParams::new(32, 4, 16).expect("Params must be valid");

        let db = vec![0u8; params.db_byte_len()];
        let mut out = vec![0u8; params.answer_byte_len()];

        answer_query(&db, &params, indices, &mut out)
    }
}
