//! Nearest-palette mapping for every color observed during training.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::color::{ColorScience, Truecolor};
use crate::error::{RaptorError, RaptorResult};
use crate::palette::{Palette, PerceptualColor};

/// Total function from observed truecolors to palette truecolors.
///
/// Closed over the training color set: it is never extended at query time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantizationMap {
    mapping: HashMap<Truecolor, Truecolor>,
}

impl QuantizationMap {
    /// Map each color in `colors` to the truecolor of its nearest palette entry.
    ///
    /// Linear scan over the palette; the earliest index wins ties. The scan is
    /// per-color independent, so the parallel and sequential paths produce the
    /// same mapping.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPalette` when the palette has no entries.
    pub fn build<M>(
        palette: &Palette,
        colors: &[PerceptualColor],
        metric: &M,
        parallel: bool,
    ) -> RaptorResult<Self>
    where
        M: ColorScience + Sync,
    {
        if palette.is_empty() {
            return Err(RaptorError::EmptyPalette);
        }

        let resolve = |sample: &PerceptualColor| -> (Truecolor, Truecolor) {
            let idx = palette.nearest_index(&sample.lab, metric).unwrap_or(0);
            (sample.color, palette.entries()[idx].color)
        };

        let mapping = if parallel {
            colors.par_iter().map(resolve).collect()
        } else {
            colors.iter().map(resolve).collect()
        };

        Ok(Self { mapping })
    }

    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (Truecolor, Truecolor)>) -> Self {
        Self {
            mapping: pairs.into_iter().collect(),
        }
    }

    /// Quantized color for `color`, or `None` if training never saw it.
    #[inline]
    pub fn get(&self, color: Truecolor) -> Option<Truecolor> {
        self.mapping.get(&color.opaque()).copied()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Truecolor, Truecolor)> + '_ {
        self.mapping.iter().map(|(&from, &to)| (from, to))
    }

    /// Pairs sorted by source color, for deterministic serialization.
    pub fn sorted_pairs(&self) -> Vec<(Truecolor, Truecolor)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_unstable_by_key(|&(from, _)| from);
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{DistanceMetric, ReferenceColor};
    use crate::palette::{PaletteBuilder, UniqueColors};

    fn gradient_colors() -> UniqueColors {
        (0..120u32)
            .map(|i| Truecolor::rgb((i * 2) as u8, (255 - i) as u8, (i * 37 % 256) as u8))
            .collect()
    }

    #[test]
    fn empty_palette_fails_fast() {
        let metric = DistanceMetric::Cie94;
        let samples = [PerceptualColor::new(Truecolor::rgb(1, 2, 3), &metric)];
        let err = QuantizationMap::build(&Palette::default(), &samples, &metric, false)
            .unwrap_err();
        assert_eq!(err, RaptorError::EmptyPalette);
    }

    #[test]
    fn maps_every_training_color_into_palette() {
        let metric = DistanceMetric::Cie94;
        let colors = gradient_colors();
        let samples = colors.to_perceptual(&metric);
        let palette = PaletteBuilder::new(8, ReferenceColor::White)
            .unwrap()
            .build(&samples, &metric);
        let map = QuantizationMap::build(&palette, &samples, &metric, false).unwrap();

        assert_eq!(map.len(), colors.len());
        for color in colors.iter() {
            let quantized = map.get(color).expect("training color is mapped");
            assert!(palette.contains(quantized));
        }
    }

    #[test]
    fn palette_colors_map_to_themselves() {
        let metric = DistanceMetric::Cie76;
        let colors = gradient_colors();
        let samples = colors.to_perceptual(&metric);
        let palette = PaletteBuilder::new(6, ReferenceColor::Black)
            .unwrap()
            .build(&samples, &metric);
        let map = QuantizationMap::build(&palette, &samples, &metric, false).unwrap();

        for entry in palette.entries() {
            assert_eq!(map.get(entry.color), Some(entry.color));
        }
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let metric = DistanceMetric::Cie94;
        let samples = gradient_colors().to_perceptual(&metric);
        let palette = PaletteBuilder::new(10, ReferenceColor::White)
            .unwrap()
            .build(&samples, &metric);

        let sequential = QuantizationMap::build(&palette, &samples, &metric, false).unwrap();
        let parallel = QuantizationMap::build(&palette, &samples, &metric, true).unwrap();
        let again = QuantizationMap::build(&palette, &samples, &metric, true).unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.sorted_pairs(), again.sorted_pairs());
    }

    #[test]
    fn unseen_colors_are_absent() {
        let metric = DistanceMetric::Cie94;
        let samples = [PerceptualColor::new(Truecolor::rgb(9, 9, 9), &metric)];
        let palette = Palette::from_colors(&[Truecolor::rgb(9, 9, 9), Truecolor::WHITE], &metric);
        let map = QuantizationMap::build(&palette, &samples, &metric, false).unwrap();

        assert_eq!(map.get(Truecolor::rgba(9, 9, 9, 17)), Some(Truecolor::rgb(9, 9, 9)));
        assert_eq!(map.get(Truecolor::rgb(200, 0, 0)), None);
    }
}
