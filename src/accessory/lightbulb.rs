use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::lightify::device::Device;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A single accessory attribute as mirrored by the accessory host.
pub struct Characteristic<T> {
    value: Arc<RwLock<T>>,
    callbacks: Arc<Mutex<Vec<Callback<T>>>>,
}

impl<T> Clone for Characteristic<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<T: Copy + Send + 'static> Characteristic<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            callbacks: Default::default(),
        }
    }

    pub fn get_value(&self) -> T {
        *self.value.read()
    }

    /// Updates the value without notifying anyone.
    pub fn set_value(&self, value: T) {
        *self.value.write() = value;
    }

    /// Registers a callback invoked whenever a remote controller writes this
    /// characteristic.
    pub fn on_value_remote_update(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Applies a write coming from a remote controller.
    pub fn remote_update(&self, value: T) {
        self.set_value(value);

        // Callbacks may register further callbacks, so don't hold the lock
        // while invoking them
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(value);
        }
    }

    fn reader(&self) -> ValueReader<T> {
        ValueReader {
            value: self.value.clone(),
        }
    }
}

/// Read-only handle to a characteristic value, without access to its
/// callbacks.
#[derive(Clone)]
struct ValueReader<T> {
    value: Arc<RwLock<T>>,
}

impl<T: Copy> ValueReader<T> {
    fn get(&self) -> T {
        *self.value.read()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccessoryInfo {
    pub name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_revision: String,
}

/// Lightbulb accessory with on/off and HSV color characteristics.
#[derive(Clone)]
pub struct Lightbulb {
    pub info: AccessoryInfo,

    pub on: Characteristic<bool>,

    /// Degrees (0 - 360)
    pub hue: Characteristic<f32>,

    /// Percent (0 - 100)
    pub saturation: Characteristic<f32>,

    /// Percent (0 - 100)
    pub brightness: Characteristic<i32>,
}

impl Lightbulb {
    pub fn new(info: AccessoryInfo) -> Self {
        Lightbulb {
            info,
            on: Characteristic::new(false),
            hue: Characteristic::new(0.0),
            saturation: Characteristic::new(0.0),
            brightness: Characteristic::new(100),
        }
    }

    /// Creates a lightbulb mirroring the current state of a Lightify device.
    pub fn from_device(device: &Device, manufacturer: &str) -> Self {
        let lightbulb = Lightbulb::new(AccessoryInfo {
            name: device.name.clone(),
            serial_number: device.id.clone(),
            manufacturer: manufacturer.to_string(),
            model: device.device_model.clone(),
            firmware_revision: device.firmware_version.clone(),
        });

        lightbulb.on.set_value(device.on_off.is_on());
        lightbulb.hue.set_value(device.color_hsv.hue);
        lightbulb.saturation.set_value(device.color_hsv.saturation);
        lightbulb.brightness.set_value(device.brightness.clamp(0, 100));

        lightbulb
    }

    pub fn id(&self) -> &str {
        &self.info.serial_number
    }

    pub fn color_source(&self) -> ColorSource {
        ColorSource {
            hue: self.hue.reader(),
            saturation: self.saturation.reader(),
            brightness: self.brightness.reader(),
        }
    }
}

/// Live view of the color affecting characteristics of a lightbulb.
#[derive(Clone)]
pub struct ColorSource {
    hue: ValueReader<f32>,
    saturation: ValueReader<f32>,
    brightness: ValueReader<i32>,
}

impl ColorSource {
    /// Current hue, saturation and brightness.
    pub fn current(&self) -> (f32, f32, f32) {
        (
            self.hue.get(),
            self.saturation.get(),
            self.brightness.get() as f32,
        )
    }
}
