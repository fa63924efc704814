use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::color::RgbwColor;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

/// Device type tag. Gateways are hubs and can not be controlled.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceType {
    Gateway,
    Other(String),
}

const GATEWAY_TAG: &str = "GATEWAY";

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Other(String::new())
    }
}

impl From<String> for DeviceType {
    fn from(tag: String) -> Self {
        if tag == GATEWAY_TAG {
            DeviceType::Gateway
        } else {
            DeviceType::Other(tag)
        }
    }
}

impl From<DeviceType> for String {
    fn from(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Gateway => GATEWAY_TAG.to_string(),
            DeviceType::Other(tag) => tag,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HsvColor {
    /// Degrees (0 - 360)
    pub hue: f32,

    /// Percent (0 - 100)
    pub saturation: f32,

    /// Percent (0 - 100)
    pub brightness: f32,
}

/// A light as reported by the Lightify API.
///
/// `color_hsv` and `color_rgbw` are maintained independently by the API and
/// may disagree with each other.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,

    #[serde(rename = "type")]
    pub device_type: DeviceType,

    pub device_model: String,
    pub firmware_version: String,
    pub online: bool,
    pub on_off: PowerState,

    /// Percent (0 - 100)
    pub brightness: i32,

    pub color_temperature: i32,

    #[serde(rename = "colorHSV")]
    pub color_hsv: HsvColor,

    #[serde(rename = "colorRGBW")]
    pub color_rgbw: RgbwColor,

    pub mode: String,
}

impl Device {
    pub fn is_controllable(&self) -> bool {
        self.device_type != DeviceType::Gateway
    }
}

/// Sparse device update. Only populated fields are sent, everything else is
/// left untouched by the API.
#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize)]
#[builder(setter(into, strip_option), default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_off: Option<PowerState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i32>,

    #[serde(rename = "colorRGBW", skip_serializing_if = "Option::is_none")]
    pub color_rgbw: Option<RgbwColor>,
}
