use super::{
    branch_opt_util,
    error::PIRError,
    rng::{RandomStream, SeededStream},
};

#[inline(always)]
fn check_permutation_size(size: usize) -> Result<(), PIRError> {
    if branch_opt_util::likely(size <= u32::MAX as usize) {
        Ok(())
    } else {
        Err(PIRError::PermutationSizeTooLarge(size))
    }
}

/// Samples a uniform random permutation of `[0, perm.len())` into `perm`, using Fisher-Yates shuffle, drawing from `stream`.
///
/// The permutation is fully determined by the state of `stream`, so re-seeding the stream identically reproduces it.
/// An empty `perm` is a valid, empty permutation and consumes no randomness.
pub fn permute<R: RandomStream>(stream: &mut R, perm: &mut [u32]) -> Result<(), PIRError> {
    check_permutation_size(perm.len())?;

    perm.iter_mut().enumerate().for_each(|(idx, v)| *v = idx as u32);

    for i in (1..perm.len()).rev() {
        let j = stream.next_below(i as u32 + 1) as usize;
        perm.swap(i, j);
    }

    Ok(())
}

/// Writes the inverse of permutation `perm` into `inv`, s.t. `perm[inv[i]] == i`, in linear time.
///
/// Every entry of `perm` is range checked, but bijectivity is not. If `perm` is not a permutation, content of `inv` is unspecified.
pub fn invert_permutation(perm: &[u32], inv: &mut [u32]) -> Result<(), PIRError> {
    if branch_opt_util::unlikely(perm.len() != inv.len()) {
        return Err(PIRError::UnexpectedBufferLength {
            expected: perm.len(),
            actual: inv.len(),
        });
    }

    let perm_size = perm.len();
    if let Some(&entry) = perm.iter().find(|&&entry| entry as usize >= perm_size) {
        branch_opt_util::cold();
        return Err(PIRError::PermutationEntryOutOfRange { entry, perm_size });
    }

    perm.iter().enumerate().for_each(|(idx, &entry)| {
        inv[entry as usize] = idx as u32;
    });

    Ok(())
}

/// Draws `chunk_count` permutations of `[0, chunk_size)`, one after another from a single stream seeded with `seed`, writing them
/// (and their inverses) into `permutations` and `inverse_permutations`, concatenated in chunk order.
///
/// Both buffers must hold exactly `chunk_count * chunk_size` entries.
pub fn generate_many(seed: u64, chunk_count: usize, chunk_size: usize, permutations: &mut [u32], inverse_permutations: &mut [u32]) -> Result<(), PIRError> {
    let mut stream = SeededStream::new(seed);
    generate_many_from_stream(&mut stream, chunk_count, chunk_size, permutations, inverse_permutations)
}

pub fn generate_many_from_stream<R: RandomStream>(
    stream: &mut R,
    chunk_count: usize,
    chunk_size: usize,
    permutations: &mut [u32],
    inverse_permutations: &mut [u32],
) -> Result<(), PIRError> {
    check_permutation_size(chunk_size)?;

    let total_num_entries = chunk_count.checked_mul(chunk_size).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;
    for buffer_len in [permutations.len(), inverse_permutations.len()] {
        if branch_opt_util::unlikely(buffer_len != total_num_entries) {
            return Err(PIRError::UnexpectedBufferLength {
                expected: total_num_entries,
                actual: buffer_len,
            });
        }
    }

    if branch_opt_util::unlikely(chunk_size == 0) {
        return Ok(());
    }

    for (perm, inv) in permutations.chunks_exact_mut(chunk_size).zip(inverse_permutations.chunks_exact_mut(chunk_size)) {
        permute(stream, perm)?;
        invert_permutation(perm, inv)?;
    }

    Ok(())
}

/// A permutation of `[0, n)` along with its inverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permutation {
    forward: Vec<u32>,
    inverse: Vec<u32>,
}

impl Permutation {
    /// Generates a uniform random permutation of `[0, size)`, deterministically from `seed`.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seeds a fresh random stream, owned by this call.
    /// * `size` - Number of points being permuted, can be zero.
    ///
    /// # Returns
    ///
    /// * `Result<Permutation, PIRError>` - The permutation and its inverse. Returns an error only if `size` doesn't fit in 32 bits.
    pub fn generate(seed: u64, size: usize) -> Result<Permutation, PIRError> {
        let mut stream = SeededStream::new(seed);
        Self::from_stream(&mut stream, size)
    }

    pub fn from_stream<R: RandomStream>(stream: &mut R, size: usize) -> Result<Permutation, PIRError> {
        check_permutation_size(size)?;

        let mut forward = vec![0u32; size];
        let mut inverse = vec![0u32; size];

        permute(stream, &mut forward)?;
        invert_permutation(&forward, &mut inverse)?;

        Ok(Permutation { forward, inverse })
    }

    #[inline(always)]
    pub fn forward(&self) -> &[u32] {
        &self.forward
    }
    #[inline(always)]
    pub fn inverse(&self) -> &[u32] {
        &self.inverse
    }
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.forward.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn into_parts(self) -> (Vec<u32>, Vec<u32>) {
        (self.forward, self.inverse)
    }
}

/// `num_chunks` permutations of equal size, drawn in sequence from one seeded stream and stored back to back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermutationSet {
    num_chunks: usize,
    perm_size: usize,
    forward: Vec<u32>,
    inverse: Vec<u32>,
}

impl PermutationSet {
    pub fn generate(seed: u64, num_chunks: usize, perm_size: usize) -> Result<PermutationSet, PIRError> {
        check_permutation_size(perm_size)?;

        let total_num_entries = num_chunks.checked_mul(perm_size).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;

        let mut forward = vec![0u32; total_num_entries];
        let mut inverse = vec![0u32; total_num_entries];

        generate_many(seed, num_chunks, perm_size, &mut forward, &mut inverse)?;

        Ok(PermutationSet {
            num_chunks,
            perm_size,
            forward,
            inverse,
        })
    }

    #[inline(always)]
    pub const fn num_chunks(&self) -> usize {
        self.num_chunks
    }
    #[inline(always)]
    pub const fn perm_size(&self) -> usize {
        self.perm_size
    }
    #[inline(always)]
    pub fn forward(&self) -> &[u32] {
        &self.forward
    }
    #[inline(always)]
    pub fn inverse(&self) -> &[u32] {
        &self.inverse
    }

    /// Returns the permutation, and its inverse, of chunk `chunk_idx`.
    pub fn chunk(&self, chunk_idx: usize) -> Option<(&[u32], &[u32])> {
        if branch_opt_util::unlikely(chunk_idx >= self.num_chunks) {
            return None;
        }

        let begin = chunk_idx * self.perm_size;
        let end = begin + self.perm_size;

        Some((&self.forward[begin..end], &self.inverse[begin..end]))
    }
}

#[cfg(test)]
pub mod test {
    use super::{Permutation, PermutationSet, generate_many, invert_permutation, permute};
    use crate::pir_internals::{
        error::PIRError,
        rng::{RandomStream, SeededStream},
    };
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;
    use test_case::test_case;

    pub fn is_bijection(perm: &[u32]) -> bool {
        let mut seen = vec![false; perm.len()];

        perm.iter().all(|&v| {
            let v = v as usize;
            if v >= seen.len() || seen[v] {
                false
            } else {
                seen[v] = true;
                true
            }
        })
    }

    #[test]
    fn generated_permutation_is_bijection_with_correct_inverse() {
        const NUM_TEST_ITERATIONS: usize = 100;
        const MAX_PERM_SIZE: usize = 4096;

        let mut rng = ChaCha8Rng::from_os_rng();

        for _ in 0..NUM_TEST_ITERATIONS {
            let seed = rng.random::<u64>();
            let size = rng.random_range(0..=MAX_PERM_SIZE);

            let perm = Permutation::generate(seed, size).expect("Permutation must be generated");

            assert_eq!(perm.len(), size);
            assert!(is_bijection(perm.forward()));
            assert!(is_bijection(perm.inverse()));

            for i in 0..size {
                assert_eq!(perm.forward()[perm.inverse()[i] as usize] as usize, i);
                assert_eq!(perm.inverse()[perm.forward()[i] as usize] as usize, i);
            }
        }
    }

    #[test_case(0; "Empty permutation")]
    #[test_case(1; "Single point permutation")]
    #[test_case(2; "Two point permutation")]
    fn degenerate_sizes_are_well_defined(size: usize) {
        let perm = Permutation::generate(42, size).expect("Permutation must be generated");

        assert_eq!(perm.is_empty(), size == 0);
        assert_eq!(perm.len(), size);
        assert!(is_bijection(perm.forward()));
        assert!(is_bijection(perm.inverse()));
    }

    #[test]
    fn permutation_generation_is_deterministic() {
        const PERM_SIZE: usize = 1024;

        let mut rng = ChaCha8Rng::from_os_rng();
        let seed = rng.random::<u64>();

        let perm_a = Permutation::generate(seed, PERM_SIZE).expect("Permutation must be generated");
        let perm_b = Permutation::generate(seed, PERM_SIZE).expect("Permutation must be generated");
        assert_eq!(perm_a, perm_b);

        let perm_c = Permutation::generate(seed.wrapping_add(1), PERM_SIZE).expect("Permutation must be generated");
        assert_ne!(perm_a, perm_c);
    }

    #[test]
    fn permutations_of_three_points_are_uniformly_distributed() {
        const NUM_SAMPLES: u64 = 60_000;
        const EXPECTED_COUNT: u64 = NUM_SAMPLES / 6;
        const TOLERANCE: u64 = EXPECTED_COUNT / 20;

        let mut counts: HashMap<Vec<u32>, u64> = HashMap::new();

        for seed in 0..NUM_SAMPLES {
            let perm = Permutation::generate(seed, 3).expect("Permutation must be generated");
            *counts.entry(perm.forward().to_vec()).or_default() += 1;
        }

        assert_eq!(counts.len(), 6);
        assert!(counts.values().all(|&count| count.abs_diff(EXPECTED_COUNT) <= TOLERANCE));
    }

    #[test]
    fn batch_generation_draws_from_one_continuous_stream() {
        const NUM_CHUNKS: usize = 8;
        const CHUNK_SIZE: usize = 64;
        const SEED: u64 = 0xdead_beef;

        let mut permutations = vec![0u32; NUM_CHUNKS * CHUNK_SIZE];
        let mut inverse_permutations = vec![0u32; NUM_CHUNKS * CHUNK_SIZE];
        generate_many(SEED, NUM_CHUNKS, CHUNK_SIZE, &mut permutations, &mut inverse_permutations).expect("Permutations must be generated");

        let mut stream = SeededStream::new(SEED);
        for chunk_idx in 0..NUM_CHUNKS {
            let expected = Permutation::from_stream(&mut stream, CHUNK_SIZE).expect("Permutation must be generated");
            let range = chunk_idx * CHUNK_SIZE..(chunk_idx + 1) * CHUNK_SIZE;

            assert_eq!(expected.forward(), &permutations[range.clone()]);
            assert_eq!(expected.inverse(), &inverse_permutations[range]);
        }

        // Not independently re-seeded per chunk.
        assert_ne!(&permutations[..CHUNK_SIZE], &permutations[CHUNK_SIZE..2 * CHUNK_SIZE]);
    }

    #[test]
    fn permutation_set_exposes_chunks() {
        const NUM_CHUNKS: usize = 4;
        const PERM_SIZE: usize = 8;

        let set = PermutationSet::generate(42, NUM_CHUNKS, PERM_SIZE).expect("Permutation set must be generated");

        assert_eq!(set.num_chunks(), NUM_CHUNKS);
        assert_eq!(set.perm_size(), PERM_SIZE);
        assert_eq!(set.forward().len(), NUM_CHUNKS * PERM_SIZE);

        for chunk_idx in 0..NUM_CHUNKS {
            let (perm, inv) = set.chunk(chunk_idx).expect("Chunk must exist");

            assert!(is_bijection(perm));
            (0..PERM_SIZE).for_each(|i| assert_eq!(perm[inv[i] as usize] as usize, i));
        }
        assert!(set.chunk(NUM_CHUNKS).is_none());
    }

    #[test_case(4, 8, 32, 32 => matches Ok(_); "Exactly sized buffers are accepted")]
    #[test_case(4, 8, 31, 32 => matches Err(PIRError::UnexpectedBufferLength { expected: 32, actual: 31 }); "Short permutation buffer is rejected")]
    #[test_case(4, 8, 32, 33 => matches Err(PIRError::UnexpectedBufferLength { expected: 32, actual: 33 }); "Long inverse permutation buffer is rejected")]
    #[test_case(4, 0, 0, 0 => matches Ok(_); "Empty chunks are accepted")]
    fn batch_generation_validates_buffers(num_chunks: usize, chunk_size: usize, perm_len: usize, inv_len: usize) -> Result<(), PIRError> {
        let mut permutations = vec![0u32; perm_len];
        let mut inverse_permutations = vec![0u32; inv_len];

        generate_many(1, num_chunks, chunk_size, &mut permutations, &mut inverse_permutations)
    }

    #[test_case(&[2, 0, 1], 3 => matches Ok(_); "Valid permutation can be inverted")]
    #[test_case(&[2, 0, 3], 3 => matches Err(PIRError::PermutationEntryOutOfRange { entry: 3, perm_size: 3 }); "Out of range entry is rejected")]
    #[test_case(&[1, 0], 3 => matches Err(PIRError::UnexpectedBufferLength { expected: 2, actual: 3 }); "Inverse buffer must match permutation length")]
    fn inverting_permutation_validates_input(perm: &[u32], inv_len: usize) -> Result<Vec<u32>, PIRError> {
        let mut inv = vec![0u32; inv_len];
        invert_permutation(perm, &mut inv)?;

        Ok(inv)
    }

    #[test]
    fn permute_resets_buffer_before_shuffling() {
        struct NoSwap;

        impl RandomStream for NoSwap {
            fn next_below(&mut self, bound: u32) -> u32 {
                bound - 1
            }
        }

        let mut perm = vec![7u32; 5];
        permute(&mut NoSwap, &mut perm).expect("Permutation must be sampled");

        assert_eq!(perm, vec![0, 1, 2, 3, 4]);
    }
}
