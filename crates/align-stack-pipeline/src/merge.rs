//! Per-pixel combination of the reference and warped candidates.

use align_stack_core::Frame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{AlignError, WarpedFrame};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    #[default]
    Mean,
    Median,
}

/// Stacked image in the reference geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct StackResult {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
    /// Frames that contributed to each pixel, reference included.
    pub contributions: Vec<u16>,
}

impl StackResult {
    /// Samples rounded and clamped to 8 bits.
    pub fn to_u8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StackMerger {
    pub rule: CombineRule,
}

impl StackMerger {
    pub fn new(rule: CombineRule) -> Self {
        Self { rule }
    }

    /// Combine `reference` with `layers`.
    ///
    /// The reference contributes everywhere; a layer only where it is valid.
    /// Output rows are computed independently in parallel.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(layers = layers.len(), rule = ?self.rule))
    )]
    pub fn merge(
        &self,
        reference: &Frame,
        layers: &[WarpedFrame],
    ) -> Result<StackResult, AlignError> {
        let (w, h) = reference.dimensions();
        let c = reference.channels() as usize;
        for (i, l) in layers.iter().enumerate() {
            if l.width != w || l.height != h || l.channels != c {
                return Err(AlignError::Internal(format!(
                    "layer {i} is {}x{}x{}, reference is {w}x{h}x{c}",
                    l.width, l.height, l.channels
                )));
            }
        }
        if layers.len() >= u16::MAX as usize {
            return Err(AlignError::Internal(format!(
                "{} layers exceed the contribution counter",
                layers.len()
            )));
        }

        let base = reference.data();
        let rule = self.rule;
        let mut data = vec![0.0f32; w * h * c];
        let mut contributions = vec![0u16; w * h];

        data.par_chunks_mut(w * c)
            .zip(contributions.par_chunks_mut(w))
            .enumerate()
            .for_each(|(y, (row, counts))| {
                let mut values: Vec<f32> = Vec::with_capacity(layers.len() + 1);
                let mut live: Vec<&WarpedFrame> = Vec::with_capacity(layers.len());
                for x in 0..w {
                    let px = y * w + x;
                    live.clear();
                    live.extend(layers.iter().filter(|l| l.valid[px]));
                    counts[x] = live.len() as u16 + 1;
                    for k in 0..c {
                        values.clear();
                        values.push(base[px * c + k] as f32);
                        values.extend(live.iter().map(|l| l.data[px * c + k]));
                        row[x * c + k] = combine(rule, &mut values);
                    }
                }
            });

        Ok(StackResult {
            width: w,
            height: h,
            channels: c,
            data,
            contributions,
        })
    }
}

/// Combine a non-empty set of samples; `values` may be reordered.
pub(crate) fn combine(rule: CombineRule, values: &mut [f32]) -> f32 {
    match rule {
        CombineRule::Mean => {
            let sum: f64 = values.iter().map(|&v| v as f64).sum();
            (sum / values.len() as f64) as f32
        }
        CombineRule::Median => {
            values.sort_unstable_by(f32::total_cmp);
            let n = values.len();
            let mid = n / 2;
            if n % 2 == 1 {
                values[mid]
            } else {
                (values[mid - 1] + values[mid]) * 0.5
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_stack_core::GrayImage;

    fn layer(w: usize, h: usize, value: f32, valid: bool) -> WarpedFrame {
        WarpedFrame {
            width: w,
            height: h,
            channels: 1,
            data: vec![if valid { value } else { 0.0 }; w * h],
            valid: vec![valid; w * h],
        }
    }

    fn flat(w: usize, h: usize, v: u8) -> Frame {
        Frame::from_gray("ref", GrayImage::filled(w, h, v)).unwrap()
    }

    #[test]
    fn mean_ignores_layer_order() {
        let reference = flat(3, 2, 10);
        let a = layer(3, 2, 40.0, true);
        let b = layer(3, 2, 17.0, true);
        let c = layer(3, 2, 250.0, true);
        let m = StackMerger::new(CombineRule::Mean);
        let one = m.merge(&reference, &[a.clone(), b.clone(), c.clone()]).unwrap();
        let two = m.merge(&reference, &[c, a, b]).unwrap();
        assert_eq!(one, two);
        assert!((one.data[0] - 79.25).abs() < 1e-4);
        assert!(one.contributions.iter().all(|&n| n == 4));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let reference = flat(2, 2, 10);
        let layers = [
            layer(2, 2, 30.0, true),
            layer(2, 2, 20.0, true),
            layer(2, 2, 200.0, true),
        ];
        let out = StackMerger::new(CombineRule::Median)
            .merge(&reference, &layers)
            .unwrap();
        // Sorted 10, 20, 30, 200.
        assert!(out.data.iter().all(|&v| v == 25.0));
    }

    #[test]
    fn median_of_odd_count_takes_middle() {
        let mut v = [9.0, 1.0, 5.0];
        assert_eq!(combine(CombineRule::Median, &mut v), 5.0);
    }

    #[test]
    fn invalid_layers_do_not_contribute() {
        let reference = flat(2, 1, 100);
        let mut partial = layer(2, 1, 50.0, true);
        partial.valid[1] = false;
        partial.data[1] = 0.0;
        let out = StackMerger::new(CombineRule::Mean)
            .merge(&reference, &[partial, layer(2, 1, 0.0, false)])
            .unwrap();
        assert_eq!(out.data, vec![75.0, 100.0]);
        assert_eq!(out.contributions, vec![2, 1]);
    }

    #[test]
    fn no_layers_reproduces_reference() {
        let reference = flat(4, 3, 77);
        let out = StackMerger::default().merge(&reference, &[]).unwrap();
        assert_eq!(out.to_u8(), reference.data());
    }

    #[test]
    fn mismatched_layer_is_rejected() {
        let reference = flat(4, 3, 0);
        let err = StackMerger::default()
            .merge(&reference, &[layer(3, 3, 0.0, true)])
            .unwrap_err();
        assert!(matches!(err, AlignError::Internal(_)));
    }
}
