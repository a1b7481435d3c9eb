//! Nearest/second-nearest descriptor matching with a ratio test.

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::lsh::{LshIndex, Neighbour};
use crate::{Descriptor, MatcherParams};

/// Correspondence between a reference and a candidate descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub reference_idx: usize,
    pub candidate_idx: usize,
    /// Hamming distance.
    pub distance: u32,
}

/// Matcher selection as requested by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherMethod {
    /// Pick by problem size, see [`MatcherMethod::resolve`].
    #[default]
    Auto,
    #[serde(alias = "bf")]
    BruteForce,
    /// Approximate nearest neighbours through an LSH index.
    Flann,
}

/// Matcher actually run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStrategy {
    #[serde(rename = "brute_force")]
    BruteForce,
    #[serde(rename = "flann")]
    Approximate,
}

impl MatcherMethod {
    /// Resolve to a concrete strategy.
    ///
    /// `Auto` picks brute force while `combined` (descriptor count of the
    /// pair) is below `crossover`, the index otherwise.
    pub fn resolve(self, combined: usize, crossover: usize) -> MatchStrategy {
        match self {
            MatcherMethod::BruteForce => MatchStrategy::BruteForce,
            MatcherMethod::Flann => MatchStrategy::Approximate,
            MatcherMethod::Auto if combined < crossover => MatchStrategy::BruteForce,
            MatcherMethod::Auto => MatchStrategy::Approximate,
        }
    }
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStrategy::BruteForce => "brute_force",
            MatchStrategy::Approximate => "flann",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorMatcher {
    params: MatcherParams,
}

impl DescriptorMatcher {
    pub fn new(params: MatcherParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    /// Match every reference descriptor against the candidate set.
    ///
    /// A reference descriptor yields a match only when it has two reachable
    /// neighbours and `d1 < ratio * d2`. Output is sorted by ascending
    /// distance, ties by reference index.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, reference, candidate),
            fields(reference = reference.len(), candidate = candidate.len())
        )
    )]
    pub fn match_descriptors(
        &self,
        reference: &[Descriptor],
        candidate: &[Descriptor],
        strategy: MatchStrategy,
    ) -> Vec<Match> {
        if reference.is_empty() || candidate.len() < 2 {
            return Vec::new();
        }

        let pairs: Vec<(Option<Neighbour>, Option<Neighbour>)> = match strategy {
            MatchStrategy::BruteForce => reference
                .iter()
                .map(|q| brute_force_two(q, candidate))
                .collect(),
            MatchStrategy::Approximate => {
                let index = LshIndex::build(candidate, &self.params.lsh);
                reference.iter().map(|q| index.nearest_two(q)).collect()
            }
        };

        let ratio = self.params.ratio;
        let mut matches: Vec<Match> = pairs
            .into_iter()
            .enumerate()
            .filter_map(|(reference_idx, pair)| {
                let (Some((candidate_idx, d1)), Some((_, d2))) = pair else {
                    return None;
                };
                ((d1 as f32) < ratio * d2 as f32).then_some(Match {
                    reference_idx,
                    candidate_idx,
                    distance: d1,
                })
            })
            .collect();

        matches.sort_by_key(|m| (m.distance, m.reference_idx));
        log::debug!(
            "{} of {} reference descriptors matched ({})",
            matches.len(),
            reference.len(),
            strategy
        );
        matches
    }
}

fn brute_force_two(
    query: &Descriptor,
    candidate: &[Descriptor],
) -> (Option<Neighbour>, Option<Neighbour>) {
    let mut best: Option<Neighbour> = None;
    let mut second: Option<Neighbour> = None;
    for (i, d) in candidate.iter().enumerate() {
        let dist = query.hamming(d);
        // Strict comparisons keep the lower index on ties.
        if best.is_none_or(|b| dist < b.1) {
            second = best;
            best = Some((i, dist));
        } else if second.is_none_or(|s| dist < s.1) {
            second = Some((i, dist));
        }
    }
    (best, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(seed: u64) -> Descriptor {
        let mut x = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut next = || {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            x
        };
        Descriptor([next(), next(), next(), next()])
    }

    fn flipped(d: Descriptor, bits: &[usize]) -> Descriptor {
        let mut out = d;
        for &b in bits {
            out.0[b / 64] ^= 1 << (b % 64);
        }
        out
    }

    #[test]
    fn auto_resolution_uses_crossover() {
        assert_eq!(
            MatcherMethod::Auto.resolve(499, 500),
            MatchStrategy::BruteForce
        );
        assert_eq!(
            MatcherMethod::Auto.resolve(500, 500),
            MatchStrategy::Approximate
        );
        assert_eq!(
            MatcherMethod::BruteForce.resolve(10_000, 500),
            MatchStrategy::BruteForce
        );
        assert_eq!(MatcherMethod::Flann.resolve(0, 500), MatchStrategy::Approximate);
    }

    #[test]
    fn method_names_round_trip_through_json() {
        let m: MatcherMethod = serde_json::from_str("\"bf\"").unwrap();
        assert_eq!(m, MatcherMethod::BruteForce);
        let m: MatcherMethod = serde_json::from_str("\"brute_force\"").unwrap();
        assert_eq!(m, MatcherMethod::BruteForce);
        let m: MatcherMethod = serde_json::from_str("\"flann\"").unwrap();
        assert_eq!(m, MatcherMethod::Flann);
        assert_eq!(
            serde_json::to_string(&MatchStrategy::Approximate).unwrap(),
            "\"flann\""
        );
        assert_eq!(MatchStrategy::BruteForce.to_string(), "brute_force");
    }

    #[test]
    fn ratio_test_drops_ambiguous_descriptors() {
        let a = desc(1);
        let b = desc(2);
        // `a` has a clear winner over a farther relative; `b` appears twice.
        let candidate = vec![
            flipped(a, &[3]),
            flipped(a, &[20, 41, 77, 130, 160, 201, 222, 250]),
            b,
            b,
            desc(3),
        ];
        let reference = vec![a, b];
        let matcher = DescriptorMatcher::default();
        for strategy in [MatchStrategy::BruteForce, MatchStrategy::Approximate] {
            let m = matcher.match_descriptors(&reference, &candidate, strategy);
            assert_eq!(
                m,
                vec![Match {
                    reference_idx: 0,
                    candidate_idx: 0,
                    distance: 1
                }],
                "{strategy}"
            );
        }
    }

    #[test]
    fn matches_sorted_by_distance_then_reference() {
        let refs: Vec<Descriptor> = (10..16).map(desc).collect();
        let candidate: Vec<Descriptor> = refs
            .iter()
            .enumerate()
            .map(|(i, &d)| flipped(d, &[i % 3, 100 + i % 3]))
            .rev()
            .collect();
        let m = DescriptorMatcher::default().match_descriptors(
            &refs,
            &candidate,
            MatchStrategy::BruteForce,
        );
        assert_eq!(m.len(), refs.len());
        for w in m.windows(2) {
            assert!((w[0].distance, w[0].reference_idx) < (w[1].distance, w[1].reference_idx));
        }
        for mm in &m {
            assert_eq!(mm.candidate_idx, refs.len() - 1 - mm.reference_idx);
        }
    }

    #[test]
    fn single_candidate_gives_no_matches() {
        let a = desc(7);
        let m =
            DescriptorMatcher::default().match_descriptors(&[a], &[a], MatchStrategy::BruteForce);
        assert!(m.is_empty());
    }
}
