//! Perceptual palette construction.
//!
//! The palette is a fixed-size set of representative colors sampled from the
//! corpus-wide unique color set. Colors are keyed by their distance from one
//! reference color, stably sorted by that key, and sampled at even steps.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::color::{ColorScience, Lab, ReferenceColor, Truecolor};
use crate::error::{RaptorError, RaptorResult};

/// Default number of palette entries.
pub const DEFAULT_PALETTE_SIZE: usize = 50;

/// Unique foreground colors in first-discovery order.
#[derive(Debug, Clone, Default)]
pub struct UniqueColors {
    order: Vec<Truecolor>,
    seen: HashSet<Truecolor>,
}

impl UniqueColors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a color; returns `true` when it was not seen before.
    ///
    /// Background samples are ignored and alpha is normalised away.
    pub fn insert(&mut self, color: Truecolor) -> bool {
        if color.is_background() {
            return false;
        }
        let color = color.opaque();
        if self.seen.insert(color) {
            self.order.push(color);
            true
        } else {
            false
        }
    }

    /// Union with `other`; unseen colors are appended in `other`'s order.
    pub fn merge(&mut self, other: UniqueColors) {
        for color in other.order {
            if self.seen.insert(color) {
                self.order.push(color);
            }
        }
    }

    pub fn contains(&self, color: Truecolor) -> bool {
        self.seen.contains(&color.opaque())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Truecolor> + '_ {
        self.order.iter().copied()
    }

    /// Convert every color once, keeping discovery order.
    pub fn to_perceptual<M: ColorScience>(&self, metric: &M) -> Vec<PerceptualColor> {
        self.order
            .iter()
            .map(|&color| PerceptualColor::new(color, metric))
            .collect()
    }
}

impl Extend<Truecolor> for UniqueColors {
    fn extend<T: IntoIterator<Item = Truecolor>>(&mut self, iter: T) {
        for color in iter {
            self.insert(color);
        }
    }
}

impl FromIterator<Truecolor> for UniqueColors {
    fn from_iter<T: IntoIterator<Item = Truecolor>>(iter: T) -> Self {
        let mut colors = UniqueColors::new();
        colors.extend(iter);
        colors
    }
}

/// A truecolor together with its precomputed perceptual form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerceptualColor {
    pub color: Truecolor,
    pub lab: Lab,
}

impl PerceptualColor {
    pub fn new<M: ColorScience>(color: Truecolor, metric: &M) -> Self {
        Self {
            color,
            lab: metric.to_perceptual(color),
        }
    }
}

/// Ordered palette of representative colors. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    entries: Vec<PerceptualColor>,
}

impl Palette {
    /// Rebuild a palette from stored truecolors (e.g. a checkpoint).
    pub fn from_colors<M: ColorScience>(colors: &[Truecolor], metric: &M) -> Self {
        Self {
            entries: colors
                .iter()
                .map(|&color| PerceptualColor::new(color, metric))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[PerceptualColor] {
        &self.entries
    }

    pub fn colors(&self) -> Vec<Truecolor> {
        self.entries.iter().map(|entry| entry.color).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, color: Truecolor) -> bool {
        self.entries.iter().any(|entry| entry.color == color)
    }

    /// Index of the closest entry; ties go to the earliest index.
    pub fn nearest_index<M: ColorScience>(&self, lab: &Lab, metric: &M) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let distance = metric.distance(lab, &entry.lab);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((idx, distance)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Truecolor of the closest entry.
    pub fn nearest<M: ColorScience>(&self, lab: &Lab, metric: &M) -> Option<Truecolor> {
        self.nearest_index(lab, metric)
            .map(|idx| self.entries[idx].color)
    }
}

/// Reduces a unique color set to `size` representative colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteBuilder {
    size: usize,
    reference: ReferenceColor,
}

impl PaletteBuilder {
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when `size < 2`; the sampling step
    /// divides by `size - 1`.
    pub fn new(size: usize, reference: ReferenceColor) -> RaptorResult<Self> {
        if size < 2 {
            return Err(RaptorError::invalid_config(
                "palette_size",
                size.to_string(),
                "must be >= 2",
            ));
        }
        Ok(Self { size, reference })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn reference(&self) -> ReferenceColor {
        self.reference
    }

    /// Sort `colors` by distance from the reference and sample `size` entries.
    ///
    /// An empty input yields an empty palette; fewer than `size` colors are
    /// padded by repeating the last sorted color.
    pub fn build<M: ColorScience>(&self, colors: &[PerceptualColor], metric: &M) -> Palette {
        if colors.is_empty() {
            return Palette::default();
        }

        let reference = metric.to_perceptual(self.reference.truecolor());
        let mut keyed: Vec<(f32, &PerceptualColor)> = colors
            .iter()
            .map(|color| (metric.distance(&reference, &color.lab), color))
            .collect();
        // Stable: equal keys keep discovery order.
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = keyed.len();
        let entries = if n < self.size {
            let last = *keyed[n - 1].1;
            keyed
                .iter()
                .map(|(_, color)| **color)
                .chain(std::iter::repeat(last).take(self.size - n))
                .collect()
        } else {
            let step = n / (self.size - 1);
            (0..self.size)
                .map(|i| *keyed[(i * step).min(n - 1)].1)
                .collect()
        };

        Palette { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DistanceMetric;

    /// Lightness taken from the red channel only; makes sort keys easy to reason about.
    struct RedOnly;

    impl ColorScience for RedOnly {
        fn to_perceptual(&self, color: Truecolor) -> Lab {
            Lab {
                l: color.r() as f32,
                a: 0.0,
                b: 0.0,
            }
        }

        fn distance(&self, a: &Lab, b: &Lab) -> f32 {
            (a.l - b.l).abs()
        }
    }

    fn reds(values: &[u8]) -> Vec<PerceptualColor> {
        values
            .iter()
            .map(|&r| PerceptualColor::new(Truecolor::rgb(r, 1, 1), &RedOnly))
            .collect()
    }

    #[test]
    fn rejects_palette_smaller_than_two() {
        assert!(PaletteBuilder::new(1, ReferenceColor::White).is_err());
        assert!(PaletteBuilder::new(0, ReferenceColor::White).is_err());
        assert!(PaletteBuilder::new(2, ReferenceColor::White).is_ok());
    }

    #[test]
    fn empty_input_gives_empty_palette() {
        let builder = PaletteBuilder::new(4, ReferenceColor::Black).unwrap();
        assert!(builder.build(&[], &RedOnly).is_empty());
    }

    #[test]
    fn samples_evenly_spaced_entries() {
        // Reference black => key == red channel; N=10, K=4 => step 3 => 0,3,6,9.
        let builder = PaletteBuilder::new(4, ReferenceColor::Black).unwrap();
        let colors = reds(&[90, 0, 80, 10, 70, 20, 60, 30, 50, 40]);
        let palette = builder.build(&colors, &RedOnly);
        let picked: Vec<u8> = palette.colors().iter().map(|c| c.r()).collect();
        assert_eq!(picked, vec![0, 30, 60, 90]);
    }

    #[test]
    fn clamps_sample_index_to_last_element() {
        // N=4, K=3 => step 2 => indices 0,2,4 -> 4 clamps to 3.
        let builder = PaletteBuilder::new(3, ReferenceColor::Black).unwrap();
        let palette = builder.build(&reds(&[3, 2, 1, 0]), &RedOnly);
        let picked: Vec<u8> = palette.colors().iter().map(|c| c.r()).collect();
        assert_eq!(picked, vec![0, 2, 3]);
    }

    #[test]
    fn pads_with_last_sorted_color_when_short() {
        let builder = PaletteBuilder::new(5, ReferenceColor::Black).unwrap();
        let palette = builder.build(&reds(&[30, 10, 20]), &RedOnly);
        let picked: Vec<u8> = palette.colors().iter().map(|c| c.r()).collect();
        assert_eq!(picked, vec![10, 20, 30, 30, 30]);
    }

    #[test]
    fn reference_white_reverses_order() {
        let builder = PaletteBuilder::new(3, ReferenceColor::White).unwrap();
        let palette = builder.build(&reds(&[0, 128, 255]), &RedOnly);
        let picked: Vec<u8> = palette.colors().iter().map(|c| c.r()).collect();
        assert_eq!(picked, vec![255, 128, 0]);
    }

    #[test]
    fn ties_keep_discovery_order() {
        // Same red channel => same key; green distinguishes discovery order.
        let colors: Vec<PerceptualColor> = [(5, 9), (5, 3), (5, 7)]
            .iter()
            .map(|&(r, g)| PerceptualColor::new(Truecolor::rgb(r, g, 0), &RedOnly))
            .collect();
        let builder = PaletteBuilder::new(3, ReferenceColor::Black).unwrap();
        let palette = builder.build(&colors, &RedOnly);
        let greens: Vec<u8> = palette.colors().iter().map(|c| c.g()).collect();
        assert_eq!(greens, vec![9, 3, 7]);
    }

    #[test]
    fn exact_size_with_real_metric() {
        let metric = DistanceMetric::Cie94;
        let colors: UniqueColors = (0..200u32)
            .map(|i| Truecolor::rgb((i * 7 % 256) as u8, (i * 13 % 256) as u8, i as u8))
            .collect();
        let builder = PaletteBuilder::new(50, ReferenceColor::White).unwrap();
        let palette = builder.build(&colors.to_perceptual(&metric), &metric);
        assert_eq!(palette.len(), 50);
    }

    #[test]
    fn unique_colors_ignores_background_and_alpha() {
        let mut colors = UniqueColors::new();
        assert!(!colors.insert(Truecolor::BACKGROUND));
        assert!(colors.insert(Truecolor::rgba(1, 2, 3, 4)));
        assert!(!colors.insert(Truecolor::rgb(1, 2, 3)));
        assert_eq!(colors.len(), 1);
        assert!(colors.contains(Truecolor::rgba(1, 2, 3, 200)));
    }

    #[test]
    fn merge_appends_unseen_in_order() {
        let mut a: UniqueColors = [Truecolor::rgb(1, 0, 0), Truecolor::rgb(2, 0, 0)]
            .into_iter()
            .collect();
        let b: UniqueColors = [Truecolor::rgb(3, 0, 0), Truecolor::rgb(1, 0, 0), Truecolor::rgb(4, 0, 0)]
            .into_iter()
            .collect();
        a.merge(b);
        let order: Vec<u8> = a.iter().map(|c| c.r()).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn nearest_prefers_earliest_on_tie() {
        let palette = Palette::from_colors(
            &[Truecolor::rgb(10, 1, 1), Truecolor::rgb(30, 1, 1), Truecolor::rgb(30, 2, 2)],
            &RedOnly,
        );
        let sample = RedOnly.to_perceptual(Truecolor::rgb(20, 0, 0));
        // 10 and 30 are both 10 away: first wins.
        assert_eq!(palette.nearest_index(&sample, &RedOnly), Some(0));
        let sample = RedOnly.to_perceptual(Truecolor::rgb(40, 0, 0));
        assert_eq!(palette.nearest_index(&sample, &RedOnly), Some(1));
    }
}
