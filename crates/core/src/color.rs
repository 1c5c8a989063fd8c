use crate::gradient::ColorGradient;
use crate::volume::value_range;

pub const DEFAULT_BRIGHTNESS: f32 = 0.8;

/// Maps scalars to 8-bit RGB through a gradient, normalized against a fixed
/// scalar range.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    gradient: ColorGradient,
    scalar_min: f32,
    scalar_max: f32,
    brightness: f32,
}

impl ColorMapper {
    pub fn new(gradient: ColorGradient, scalar_min: f32, scalar_max: f32) -> Self {
        Self {
            gradient,
            scalar_min,
            scalar_max,
            brightness: 1.0,
        }
    }

    /// Uses the observed range of `scalars`; an empty slice gives a
    /// degenerate range.
    pub fn for_scalars(gradient: ColorGradient, scalars: &[f32]) -> Self {
        let (min, max) = value_range(scalars).unwrap_or((0.0, 0.0));
        Self::new(gradient, min, max)
    }

    pub fn with_brightness(mut self, factor: f32) -> Self {
        self.brightness = if factor.is_finite() {
            factor.max(0.0)
        } else {
            1.0
        };
        self
    }

    pub fn scalar_range(&self) -> (f32, f32) {
        (self.scalar_min, self.scalar_max)
    }

    pub fn normalize(&self, scalar: f32) -> f32 {
        let span = self.scalar_max - self.scalar_min;
        if !(span > 0.0) || !scalar.is_finite() {
            return 0.5;
        }
        ((scalar - self.scalar_min) / span).clamp(0.0, 1.0)
    }

    pub fn map(&self, scalar: f32) -> [u8; 3] {
        let color = self.gradient.sample(self.normalize(scalar));
        color.map(|channel| {
            let base = (channel.clamp(0.0, 1.0) * 255.0) as u8;
            (base as f32 * self.brightness).min(255.0) as u8
        })
    }
}

pub fn map_scalar(
    scalar: f32,
    scalar_min: f32,
    scalar_max: f32,
    gradient: &ColorGradient,
    brightness: f32,
) -> [u8; 3] {
    ColorMapper::new(gradient.clone(), scalar_min, scalar_max)
        .with_brightness(brightness)
        .map(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::{GRAYSCALE, PALETTE_NAMES, RAINBOW};

    #[test]
    fn grayscale_spans_full_range() {
        let gradient = ColorGradient::named(GRAYSCALE).expect("gray");
        assert_eq!(map_scalar(0.0, 0.0, 10.0, &gradient, 1.0), [0, 0, 0]);
        assert_eq!(map_scalar(10.0, 0.0, 10.0, &gradient, 1.0), [255, 255, 255]);
        assert_eq!(map_scalar(5.0, 0.0, 10.0, &gradient, 1.0), [127, 127, 127]);
    }

    #[test]
    fn brightness_scales_channels() {
        let gradient = ColorGradient::named(GRAYSCALE).expect("gray");
        assert_eq!(
            map_scalar(10.0, 0.0, 10.0, &gradient, DEFAULT_BRIGHTNESS),
            [204, 204, 204]
        );
        assert_eq!(map_scalar(10.0, 0.0, 10.0, &gradient, 3.0), [255, 255, 255]);
    }

    #[test]
    fn degenerate_range_maps_to_midpoint() {
        let gradient = ColorGradient::named(RAINBOW).expect("rainbow");
        let mapper = ColorMapper::new(gradient, 4.0, 4.0);
        for scalar in [-100.0, 4.0, 1.0e9] {
            assert_eq!(mapper.map(scalar), [0, 255, 0]);
        }
        let empty = ColorMapper::for_scalars(ColorGradient::default(), &[]);
        assert_eq!(empty.scalar_range(), (0.0, 0.0));
        assert_eq!(empty.map(1.0), [127, 127, 127]);
    }

    #[test]
    fn out_of_range_scalars_are_clamped() {
        for name in PALETTE_NAMES {
            let gradient = ColorGradient::named(name).expect("palette");
            let mapper = ColorMapper::new(gradient.clone(), -3.0, 7.0);
            let lo = mapper.map(-1.0e6);
            let hi = mapper.map(1.0e6);
            assert_eq!(lo, mapper.map(-3.0), "{name}");
            assert_eq!(hi, mapper.map(7.0), "{name}");
        }
    }

    #[test]
    fn observed_range_drives_normalization() {
        let mapper = ColorMapper::for_scalars(ColorGradient::default(), &[2.0, 6.0, 4.0]);
        assert_eq!(mapper.scalar_range(), (2.0, 6.0));
        assert!((mapper.normalize(4.0) - 0.5).abs() < 1.0e-6);
    }
}
