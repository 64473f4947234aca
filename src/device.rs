use std::fmt;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    floppy::{self, FloppyFormat, GENERIC_FORMATS},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Printer,
    Floppy,
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCategory::Printer => write!(f, "printer"),
            DeviceCategory::Floppy => write!(f, "floppydisk"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    Type,
    Count,
    Readable,
    Writeable,
    Creatable,
    MustBeLoaded,
    ResetOnLoad,
    FileExtensions,
    FloppyOptions,
    Name,
}

/// Answer to a capability query. `Unsupported` is the defined reply for
/// anything a device does not know about.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Category(DeviceCategory),
    Formats(&'static [FloppyFormat]),
    Unsupported,
}

impl CapabilityValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CapabilityValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CapabilityValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CapabilityValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_formats(&self) -> Option<&'static [FloppyFormat]> {
        match self {
            CapabilityValue::Formats(formats) => Some(formats),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, CapabilityValue::Unsupported)
    }
}

pub type Producer = Box<dyn Fn(&Device) -> CapabilityValue>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(usize);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A device class: a category default plus the handful of facts this
/// machine reports differently.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Device {
    name: String,
    category: DeviceCategory,
    #[derivative(Debug = "ignore")]
    overrides: Vec<(CapabilityKind, Producer)>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    pub fn overrides(&self, kind: CapabilityKind) -> bool {
        self.overrides.iter().any(|(k, _)| *k == kind)
    }

    /// Overridden kinds answer from their producer; everything else falls
    /// through to the category default.
    pub fn query(&self, kind: CapabilityKind) -> CapabilityValue {
        match self.overrides.iter().find(|(k, _)| *k == kind) {
            Some((_, producer)) => producer(self),
            None => self.category.default_info(self, kind),
        }
    }
}

impl DeviceCategory {
    /// Shared behavior of every device in the category. `device` is the
    /// querying device, so derived facts follow its overrides.
    pub fn default_info(self, device: &Device, kind: CapabilityKind) -> CapabilityValue {
        match self {
            DeviceCategory::Printer => match kind {
                CapabilityKind::Type => CapabilityValue::Category(self),
                CapabilityKind::Count => CapabilityValue::Int(1),
                CapabilityKind::Readable => CapabilityValue::Bool(false),
                CapabilityKind::Writeable => CapabilityValue::Bool(true),
                CapabilityKind::Creatable => CapabilityValue::Bool(true),
                CapabilityKind::MustBeLoaded => CapabilityValue::Bool(false),
                CapabilityKind::ResetOnLoad => CapabilityValue::Bool(false),
                CapabilityKind::FileExtensions => CapabilityValue::Str("prn".to_string()),
                CapabilityKind::Name => CapabilityValue::Str(self.to_string()),
                CapabilityKind::FloppyOptions => CapabilityValue::Unsupported,
            },
            DeviceCategory::Floppy => match kind {
                CapabilityKind::Type => CapabilityValue::Category(self),
                CapabilityKind::Count => CapabilityValue::Int(1),
                CapabilityKind::Readable => CapabilityValue::Bool(true),
                CapabilityKind::Writeable => CapabilityValue::Bool(true),
                CapabilityKind::Creatable => CapabilityValue::Bool(true),
                CapabilityKind::MustBeLoaded => CapabilityValue::Bool(false),
                CapabilityKind::ResetOnLoad => CapabilityValue::Bool(false),
                CapabilityKind::FloppyOptions => CapabilityValue::Formats(GENERIC_FORMATS),
                CapabilityKind::FileExtensions => {
                    match device.query(CapabilityKind::FloppyOptions).as_formats() {
                        Some(formats) => CapabilityValue::Str(floppy::extensions(formats)),
                        None => CapabilityValue::Unsupported,
                    }
                }
                CapabilityKind::Name => CapabilityValue::Str(self.to_string()),
            },
        }
    }
}

/// Collects device classes and their overrides at configuration time.
#[derive(Debug, Default)]
pub struct DeviceRegistryBuilder {
    devices: Vec<Device>,
}

impl DeviceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, name: &str, category: DeviceCategory) -> DeviceHandle {
        self.devices.push(Device {
            name: name.to_string(),
            category,
            overrides: Vec::new(),
        });
        DeviceHandle(self.devices.len() - 1)
    }

    pub fn register_override<F>(
        &mut self,
        handle: DeviceHandle,
        kind: CapabilityKind,
        producer: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&Device) -> CapabilityValue + 'static,
    {
        let device = self
            .devices
            .get_mut(handle.0)
            .ok_or(ConfigError::UnknownDevice(handle.0))?;

        if device.overrides(kind) {
            return Err(ConfigError::DuplicateOverride {
                device: device.name.clone(),
                kind: format!("{:?}", kind),
            });
        }

        tracing::debug!("[DEVICE] {} overrides {:?}", device.name, kind);
        device.overrides.push((kind, Box::new(producer)));
        Ok(self)
    }

    /// Override `kind` with a fixed answer.
    pub fn register_value(
        &mut self,
        handle: DeviceHandle,
        kind: CapabilityKind,
        value: CapabilityValue,
    ) -> Result<&mut Self, ConfigError> {
        self.register_override(handle, kind, move |_| value.clone())
    }

    pub fn build(self) -> DeviceRegistry {
        DeviceRegistry {
            devices: self.devices,
        }
    }
}

/// Read-only lookup of device capabilities for host code that has no
/// static knowledge of the device types.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn query(&self, handle: DeviceHandle, kind: CapabilityKind) -> CapabilityValue {
        match self.devices.get(handle.0) {
            Some(device) => device.query(kind),
            None => {
                tracing::trace!("[DEVICE] Query {:?} on unknown device {}", kind, handle);
                CapabilityValue::Unsupported
            }
        }
    }

    pub fn device(&self, handle: DeviceHandle) -> Option<&Device> {
        self.devices.get(handle.0)
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceHandle, &Device)> {
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| (DeviceHandle(index), device))
    }

    /// First registered device of `category`.
    pub fn find(&self, category: DeviceCategory) -> Option<DeviceHandle> {
        self.devices()
            .find(|(_, device)| device.category == category)
            .map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
