#![cfg(test)]

use crate::{
    Block, PermutationSet, SEED_BYTE_LEN, derive_permutation_seed,
    field::{self, DistributedPointFunction, ExpandedShare, Party},
    pir_internals::{error::PIRError, params::BLOCK_BYTE_LEN},
    punctured::{PuncturedSetResponder, test::ListedSet},
    single_pass::{self, SinglePassParams},
    xor_rows,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use turboshake::TurboShake128;

fn generate_random_db(rng: &mut ChaCha8Rng, num_rows: usize, row_len: usize) -> Vec<u8> {
    let mut db = vec![0u8; num_rows * row_len];
    rng.fill_bytes(&mut db);
    db
}

fn xor_in_place(acc: &mut [u8], other: &[u8]) {
    acc.iter_mut().zip(other).for_each(|(a, &b)| *a ^= b);
}

#[test]
fn test_puncturable_set_pir() {
    const UNIV_SIZE: u32 = 1 << 10;
    const SET_SIZE: u32 = 31;
    const ROW_LEN: usize = 64;
    const NUM_QUERIES: usize = 64;

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, UNIV_SIZE as usize, ROW_LEN);

    let mut responder = PuncturedSetResponder::<ListedSet>::new(UNIV_SIZE, SET_SIZE).expect("Server setup failed");

    for _ in 0..NUM_QUERIES {
        let target = rng.random_range(0..UNIV_SIZE);
        let shift = rng.random_range(0..UNIV_SIZE);

        // Client's set holds `target`, after rotation by `shift`.
        let mut elems = (0..=SET_SIZE).map(|_| rng.random_range(0..UNIV_SIZE)).collect::<Vec<u32>>();
        let pos = rng.random_range(0..=SET_SIZE);
        elems[pos as usize] = (target + UNIV_SIZE - shift) % UNIV_SIZE;

        // Offline phase: hint is XOR of every row of the unpunctured set.
        let offsets = elems.iter().map(|&e| ((e + shift) % UNIV_SIZE) as u64 * ROW_LEN as u64).collect::<Vec<u64>>();
        let mut hint = vec![0u8; ROW_LEN];
        xor_rows(&db, &offsets, &mut hint).expect("Hint computation failed");

        // Online phase: server sees the set punctured at client's position.
        let mut response = vec![0u8; ROW_LEN];
        responder
            .answer(&ListedSet::describe(&elems), pos, shift, &db, ROW_LEN, &mut response)
            .expect("Server can't respond");

        xor_in_place(&mut response, &hint);
        assert_eq!(response, db[target as usize * ROW_LEN..(target as usize + 1) * ROW_LEN]);
    }
}

#[test]
fn test_single_pass_pir() {
    const DB_NUM_ELEMS: usize = 1 << 12;
    const SET_NUM_ELEMS: usize = 1 << 6;
    const DB_ELEM_SIZE: usize = 32;
    const NUM_QUERIES: usize = 32;

    let mut rng = ChaCha8Rng::from_os_rng();
    let params = SinglePassParams::new(DB_NUM_ELEMS, SET_NUM_ELEMS, DB_ELEM_SIZE).expect("Invalid database shape");
    let db = generate_random_db(&mut rng, DB_NUM_ELEMS, DB_ELEM_SIZE);

    let mut seed = [0u8; SEED_BYTE_LEN];
    rng.fill_bytes(&mut seed);
    let perm_seed = derive_permutation_seed(&seed);

    // Offline phase: server folds every chunk into one set of parities, client keeps them as its hint.
    let mut perms = vec![0u32; DB_NUM_ELEMS];
    let mut inv_perms = vec![0u32; DB_NUM_ELEMS];
    let mut hint = vec![0u8; params.folded_parity_byte_len()];
    single_pass::answer_single_pass_folded(&db, &params, perm_seed, &mut perms, &mut inv_perms, &mut hint).expect("Server setup failed");

    let client_perms = PermutationSet::generate(perm_seed, SET_NUM_ELEMS, params.perm_size()).expect("Client setup failed");
    let perm_size = params.perm_size();

    for _ in 0..NUM_QUERIES {
        let target = rng.random_range(0..DB_NUM_ELEMS);
        let (target_chunk, target_offset) = (target / perm_size, target % perm_size);

        // Parity slot holding target row, and the rows of every other chunk routed to the same slot.
        let slot = client_perms.forward()[target] as usize;
        let indices = (0..SET_NUM_ELEMS)
            .map(|chunk_idx| {
                if chunk_idx == target_chunk {
                    rng.random_range(0..perm_size as u32)
                } else {
                    client_perms.inverse()[chunk_idx * perm_size + slot]
                }
            })
            .collect::<Vec<u32>>();

        let mut response = vec![0u8; params.answer_byte_len()];
        single_pass::answer_query(&db, &params, &indices, &mut response).expect("Server can't respond");

        let mut record = hint[slot * DB_ELEM_SIZE..(slot + 1) * DB_ELEM_SIZE].to_vec();
        response
            .chunks_exact(DB_ELEM_SIZE)
            .enumerate()
            .filter(|&(chunk_idx, _)| chunk_idx != target_chunk)
            .for_each(|(_, row)| xor_in_place(&mut record, row));

        let row = target_chunk * perm_size + target_offset;
        assert_eq!(record, db[row * DB_ELEM_SIZE..(row + 1) * DB_ELEM_SIZE]);
    }
}

#[test]
fn test_single_pass_parities_under_concurrent_calls() {
    const NUM_THREADS: u64 = 8;

    let mut rng = ChaCha8Rng::from_os_rng();
    let params = SinglePassParams::new(1 << 10, 1 << 4, 16).expect("Invalid database shape");
    let db = generate_random_db(&mut rng, params.db_num_elems(), params.db_elem_size());

    let compute = |seed: u64| {
        let mut perms = vec![0u32; params.db_num_elems()];
        let mut inv_perms = vec![0u32; params.db_num_elems()];
        let mut parities = vec![0u8; params.parity_byte_len()];

        single_pass::answer_single_pass(&db, &params, seed, &mut perms, &mut inv_perms, &mut parities).expect("Failed to compute parities");
        parities
    };
    let compute = &compute;

    let sequential = (0..NUM_THREADS).map(compute).collect::<Vec<Vec<u8>>>();
    let concurrent = std::thread::scope(|s| {
        let handles = (0..NUM_THREADS).map(|seed| s.spawn(move || compute(seed))).collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().expect("Thread panicked")).collect::<Vec<Vec<u8>>>()
    });

    assert_eq!(sequential, concurrent);
}

/// Point function sharing where the first key is a TurboSHAKE128 seed, and the second one is the same seed, along with the point and
/// its value in clear. Expansions XOR to the point function, but the second key hides nothing, good for testing only.
struct MaskedPointDpf;

impl MaskedPointDpf {
    const MASK_SEED_BYTE_LEN: usize = 16;
    const SECOND_KEY_BYTE_LEN: usize = Self::MASK_SEED_BYTE_LEN + std::mem::size_of::<u64>() + BLOCK_BYTE_LEN;

    fn mask(seed: &[u8], domain: usize) -> Vec<u8> {
        let mut hasher = TurboShake128::default();
        hasher.absorb(seed);
        hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

        let mut mask = vec![0u8; domain * BLOCK_BYTE_LEN];
        hasher.squeeze(&mut mask);
        mask
    }
}

impl DistributedPointFunction for MaskedPointDpf {
    type Expansion = ExpandedShare;

    fn key_gen(&self, domain: usize, points: &[u64], values: &[Block], seed: u64) -> Result<(Vec<u8>, Vec<u8>), PIRError> {
        let (&point, &value) = match (points, values) {
            ([point], [value]) => (point, value),
            _ => return Err(PIRError::UnsupportedNumberOfDpfPoints(points.len() as u64)),
        };
        if point as usize >= domain {
            return Err(PIRError::DpfEvaluationFailed(format!("point {} outside domain", point)));
        }

        let mut key0 = vec![0u8; Self::MASK_SEED_BYTE_LEN];
        ChaCha8Rng::seed_from_u64(seed).fill_bytes(&mut key0);

        let mut key1 = key0.clone();
        key1.extend_from_slice(&point.to_le_bytes());
        key1.extend_from_slice(value.as_bytes());

        Ok((key0, key1))
    }

    fn expand(&self, party: Party, domain: usize, _: u64, key: &[u8]) -> Result<ExpandedShare, PIRError> {
        let expected_key_len = match party {
            Party::First => Self::MASK_SEED_BYTE_LEN,
            Party::Second => Self::SECOND_KEY_BYTE_LEN,
        };
        if key.len() != expected_key_len {
            return Err(PIRError::DpfEvaluationFailed("malformed key".to_string()));
        }

        let mut expansion = Self::mask(&key[..Self::MASK_SEED_BYTE_LEN], domain);

        if party == Party::Second {
            let (point_bytes, value) = key[Self::MASK_SEED_BYTE_LEN..].split_at(std::mem::size_of::<u64>());
            let point = u64::from_le_bytes(point_bytes.try_into().map_err(|_| PIRError::DpfEvaluationFailed("malformed key".to_string()))?) as usize;

            if point >= domain {
                return Err(PIRError::DpfEvaluationFailed(format!("point {} outside domain", point)));
            }

            xor_in_place(&mut expansion[point * BLOCK_BYTE_LEN..(point + 1) * BLOCK_BYTE_LEN], value);
        }

        ExpandedShare::from_bytes(&expansion)
    }
}

#[test]
fn test_dpf_pir() {
    const DOMAIN: usize = 1 << 10;
    const NUM_QUERIES: usize = 32;

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, DOMAIN, BLOCK_BYTE_LEN);

    for _ in 0..NUM_QUERIES {
        let target = rng.random_range(0..DOMAIN);
        let (key0, key1) = MaskedPointDpf.key_gen(DOMAIN, &[target as u64], &[Block::ONE], rng.random()).expect("Client can't query");

        let answer0 = field::answer(&MaskedPointDpf, Party::First, 1, &key0, &db).expect("Server can't respond");
        let answer1 = field::answer(&MaskedPointDpf, Party::Second, 1, &key1, &db).expect("Server can't respond");

        assert_eq!((answer0 ^ answer1).as_bytes(), &db[target * BLOCK_BYTE_LEN..(target + 1) * BLOCK_BYTE_LEN]);
    }
}

#[test]
fn test_authenticated_dpf_pir() {
    const DOMAIN: usize = 1 << 8;

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, DOMAIN, BLOCK_BYTE_LEN);

    let target = rng.random_range(0..DOMAIN) as u64;

    let mut alpha_bytes = [0u8; BLOCK_BYTE_LEN];
    rng.fill_bytes(&mut alpha_bytes);
    let alpha = Block::new(alpha_bytes);

    let (query0, query1) = MaskedPointDpf.key_gen(DOMAIN, &[target], &[Block::ONE], rng.random()).expect("Client can't query");
    let (auth0, auth1) = MaskedPointDpf.key_gen(DOMAIN, &[target], &[alpha], rng.random()).expect("Client can't query");

    let answer0 = field::answer_authenticated(&MaskedPointDpf, Party::First, 1, &query0, &auth0, &db).expect("Server can't respond");
    let answer1 = field::answer_authenticated(&MaskedPointDpf, Party::Second, 1, &query1, &auth1, &db).expect("Server can't respond");

    let record = answer0.query ^ answer1.query;
    assert_eq!(record.gfmul(alpha), answer0.auth ^ answer1.auth);
    assert_eq!(record.as_bytes(), &db[target as usize * BLOCK_BYTE_LEN..(target as usize + 1) * BLOCK_BYTE_LEN]);

    // A server tampering with its answer is caught by the client.
    let mut tampered_bytes = answer1.query.to_bytes();
    tampered_bytes[0] ^= 1;
    let tampered = answer0.query ^ Block::new(tampered_bytes);

    assert_ne!(tampered.gfmul(alpha), answer0.auth ^ answer1.auth);
}
