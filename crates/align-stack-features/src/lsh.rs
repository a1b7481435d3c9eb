//! Multi-table, multi-probe locality-sensitive hashing over binary
//! descriptors.
//!
//! Each table hashes a descriptor by a fixed random subset of its bits.
//! A query probes its own bucket plus every bucket whose key differs in at
//! most `probe_level` bits, in every table, and ranks the union of bucket
//! members by exact Hamming distance.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{Descriptor, LshParams};

const LSH_SEED: u64 = 0x15b_a11_5eed;

struct Table {
    bits: Vec<usize>,
    buckets: HashMap<u32, Vec<u32>>,
}

impl Table {
    fn key(&self, d: &Descriptor) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .fold(0u32, |key, (i, &b)| key | ((d.bit(b) as u32) << i))
    }
}

/// Index over one descriptor set.
pub struct LshIndex<'a> {
    descriptors: &'a [Descriptor],
    tables: Vec<Table>,
    probe_level: usize,
}

/// Nearest neighbour found by a query: `(index, distance)`.
pub type Neighbour = (usize, u32);

impl<'a> LshIndex<'a> {
    pub fn build(descriptors: &'a [Descriptor], params: &LshParams) -> Self {
        let key_bits = params.key_bits.clamp(1, 32);
        let mut rng = ChaCha8Rng::seed_from_u64(LSH_SEED);
        let tables = (0..params.tables.max(1))
            .map(|_| {
                let mut bits = rand::seq::index::sample(&mut rng, Descriptor::BITS, key_bits)
                    .into_vec();
                bits.sort_unstable();
                let mut table = Table {
                    bits,
                    buckets: HashMap::new(),
                };
                for (i, d) in descriptors.iter().enumerate() {
                    let key = table.key(d);
                    table.buckets.entry(key).or_default().push(i as u32);
                }
                table
            })
            .collect();
        Self {
            descriptors,
            tables,
            probe_level: params.probe_level,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Two closest reachable descriptors, ordered by `(distance, index)`.
    ///
    /// The result does not depend on the order buckets are visited.
    pub fn nearest_two(&self, query: &Descriptor) -> (Option<Neighbour>, Option<Neighbour>) {
        let mut seen = vec![false; self.descriptors.len()];
        let mut best: Option<Neighbour> = None;
        let mut second: Option<Neighbour> = None;

        for table in &self.tables {
            let key = table.key(query);
            let width = table.bits.len();
            for_each_probe(key, width, self.probe_level, &mut |probe| {
                let Some(members) = table.buckets.get(&probe) else {
                    return;
                };
                for &m in members {
                    let m = m as usize;
                    if std::mem::replace(&mut seen[m], true) {
                        continue;
                    }
                    let cand = (m, query.hamming(&self.descriptors[m]));
                    let rank = |n: Neighbour| (n.1, n.0);
                    if best.is_none_or(|b| rank(cand) < rank(b)) {
                        second = best;
                        best = Some(cand);
                    } else if second.is_none_or(|s| rank(cand) < rank(s)) {
                        second = Some(cand);
                    }
                }
            });
        }
        (best, second)
    }
}

/// Visit `key` and every key within Hamming distance `level` of it over the
/// low `width` bits.
fn for_each_probe(key: u32, width: usize, level: usize, visit: &mut impl FnMut(u32)) {
    fn flip(key: u32, from: usize, width: usize, left: usize, visit: &mut impl FnMut(u32)) {
        if left == 0 {
            return;
        }
        for b in from..width {
            let probe = key ^ (1u32 << b);
            visit(probe);
            flip(probe, b + 1, width, left - 1, visit);
        }
    }
    visit(key);
    flip(key, 0, width, level, visit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_cover_hamming_ball_once() {
        let mut keys = Vec::new();
        for_each_probe(0b1010, 5, 2, &mut |k| keys.push(k));
        // 1 + C(5,1) + C(5,2)
        assert_eq!(keys.len(), 16);
        let mut dedup = keys.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), keys.len());
        assert!(keys.iter().all(|k| (k ^ 0b1010).count_ones() <= 2));
    }

    #[test]
    fn finds_exact_duplicate_first() {
        let descs: Vec<Descriptor> = (0..50u64)
            .map(|i| {
                let x = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                Descriptor([x, x.rotate_left(13), !x, x ^ 0x5555])
            })
            .collect();
        let index = LshIndex::build(&descs, &LshParams::default());
        let (best, _) = index.nearest_two(&descs[17]);
        assert_eq!(best, Some((17, 0)));
    }

    #[test]
    fn near_neighbours_are_ranked_by_distance() {
        let base = Descriptor([0xdead_beef, 0x1234_5678_9abc, 0, u64::MAX]);
        let mut one_off = base;
        one_off.0[3] ^= 1 << 7;
        let mut three_off = base;
        three_off.0[0] ^= 0b111;
        let descs = vec![three_off, one_off];
        let index = LshIndex::build(&descs, &LshParams::default());
        let (best, second) = index.nearest_two(&base);
        assert_eq!(best, Some((1, 1)));
        assert_eq!(second, Some((0, 3)));
    }
}
