//! Colors
//!
//! Colors are stored straight (non-premultiplied) in linear space. Blending and
//! interpolation go through [`Color::premultiplied`] so that fading towards
//! [`Color::TRANSPARENT`] does not darken the color on the way.
//!
//! Premultiplied channels cannot carry a hue at zero alpha, so
//! [`Color::from_premultiplied`] is lossy there. Callers that know the color
//! they are heading for restore the hue from it.

/// RGBA color (linear space)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a `0xRRGGBB` literal
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xFF) as f32 / 255.0;
        let g = ((hex >> 8) & 0xFF) as f32 / 255.0;
        let b = (hex & 0xFF) as f32 / 255.0;
        Self::rgb(r, g, b)
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.a = alpha;
        self
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    /// Color channels multiplied by alpha: `[r*a, g*a, b*a, a]`
    pub fn premultiplied(&self) -> [f32; 4] {
        [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
    }

    /// Inverse of [`Color::premultiplied`]
    ///
    /// Any non-positive alpha collapses to [`Color::TRANSPARENT`], since the
    /// color channels carry no information once alpha is gone.
    pub fn from_premultiplied(rgba: [f32; 4]) -> Self {
        let [r, g, b, a] = rgba;
        if a <= f32::EPSILON {
            return Self::TRANSPARENT;
        }
        Self::rgba(r / a, g / a, b / a, a)
    }

    /// Interpolate in premultiplied space
    pub fn lerp(a: &Color, b: &Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let pa = a.premultiplied();
        let pb = b.premultiplied();
        let mut out = [0.0; 4];
        for i in 0..4 {
            out[i] = pa[i] + (pb[i] - pa[i]) * t;
        }
        Color::from_premultiplied(out)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let c = Color::from_hex(0xFF8000);
        assert_eq!(c.r, 1.0);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.b, 0.0);
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn test_zero_alpha_drops_hue() {
        let clear_red = Color::rgba(1.0, 0.0, 0.0, 0.0);
        assert_eq!(
            Color::from_premultiplied(clear_red.premultiplied()),
            Color::TRANSPARENT
        );
        let teal = Color::rgba(0.0, 0.5, 0.5, 0.5);
        assert_eq!(Color::from_premultiplied(teal.premultiplied()), teal);
    }

    #[test]
    fn test_fade_to_transparent_keeps_hue() {
        let red = Color::RED;
        let half = Color::lerp(&red, &Color::TRANSPARENT, 0.5);
        assert!((half.r - 1.0).abs() < 1e-6);
        assert!((half.a - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_premultiplied_round_trip() {
        let c = Color::rgba(0.2, 0.4, 0.6, 0.5);
        let back = Color::from_premultiplied(c.premultiplied());
        assert!((back.r - c.r).abs() < 1e-6);
        assert!((back.g - c.g).abs() < 1e-6);
        assert!((back.b - c.b).abs() < 1e-6);
        assert_eq!(back.a, c.a);
    }

    #[test]
    fn test_transparent_normalizes() {
        let c = Color::from_premultiplied([0.3, 0.1, 0.2, 0.0]);
        assert_eq!(c, Color::TRANSPARENT);
    }
}
