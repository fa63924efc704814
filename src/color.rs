//! Conversion from the HSV color model used by accessory color pickers to the
//! RGBW channels accepted by the Lightify API.

use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RgbwColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Converts hue (degrees), saturation and brightness (both percent) into RGBW.
///
/// Hue wraps at 360 degrees, saturation and brightness are clamped to
/// `0..=100`. HSV carries no independent white component, so the white
/// channel is always driven at full intensity.
pub fn hsv_to_rgbw(hue: f32, saturation: f32, brightness: f32) -> RgbwColor {
    let hue = finite_or_zero(hue).rem_euclid(360.0);
    let saturation = finite_or_zero(saturation).clamp(0.0, 100.0) / 100.0;
    let brightness = finite_or_zero(brightness).clamp(0.0, 100.0) / 100.0;

    let hsv: Hsv = Hsv::new(hue, saturation, brightness);
    let rgb: Srgb<u8> = Srgb::from_color(hsv).into_format();

    RgbwColor {
        red: rgb.red,
        green: rgb.green,
        blue: rgb.blue,
        white: u8::MAX,
    }
}
