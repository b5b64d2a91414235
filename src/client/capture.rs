//! Local capture collaborator
//!
//! Device enumeration and track acquisition live outside this crate; a
//! producer only needs the two operations of [`MediaSource`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::Track;

/// One capture device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }
}

/// Which device to capture from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    /// First device the platform lists
    #[default]
    First,
    /// Device with this id
    Id(String),
}

/// Local capture unavailable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAcquisitionError {
    #[error("no capture device available")]
    NoDevice,

    #[error("capture device not found: {0}")]
    DeviceNotFound(String),

    #[error("capture permission denied")]
    PermissionDenied,

    #[error("capture unavailable: {0}")]
    Unavailable(String),
}

/// Capture hardware as seen by a producer
pub trait MediaSource: Clone + Send + Sync + 'static {
    /// Devices currently available
    fn list_capture_devices(&self) -> Vec<DeviceDescriptor>;

    /// Open a live track on `device`; may take arbitrarily long
    fn acquire_track(
        &self,
        device: &DeviceDescriptor,
    ) -> impl Future<Output = Result<Track, MediaAcquisitionError>> + Send;
}

/// Pick the device a selector refers to
pub fn resolve_device(
    devices: &[DeviceDescriptor],
    selector: &DeviceSelector,
) -> Result<DeviceDescriptor, MediaAcquisitionError> {
    match selector {
        DeviceSelector::First => devices.first().cloned().ok_or(MediaAcquisitionError::NoDevice),
        DeviceSelector::Id(id) => devices
            .iter()
            .find(|d| &d.device_id == id)
            .cloned()
            .ok_or_else(|| MediaAcquisitionError::DeviceNotFound(id.clone())),
    }
}

/// Resolve a selector and acquire a track from the chosen device
pub async fn acquire<S: MediaSource>(
    source: &S,
    selector: &DeviceSelector,
) -> Result<(DeviceDescriptor, Track), MediaAcquisitionError> {
    let device = resolve_device(&source.list_capture_devices(), selector)?;
    let track = source.acquire_track(&device).await?;
    Ok((device, track))
}

/// Source for peers that never capture (subscribers)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl MediaSource for NoCapture {
    fn list_capture_devices(&self) -> Vec<DeviceDescriptor> {
        Vec::new()
    }

    fn acquire_track(
        &self,
        _device: &DeviceDescriptor,
    ) -> impl Future<Output = Result<Track, MediaAcquisitionError>> + Send {
        std::future::ready(Err(MediaAcquisitionError::NoDevice))
    }
}

/// Fixed device list handing out synthetic camera tracks
#[derive(Debug, Clone)]
pub struct StaticSource {
    devices: Arc<Vec<DeviceDescriptor>>,
    denied: bool,
}

impl StaticSource {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Arc::new(devices),
            denied: false,
        }
    }

    /// Source whose devices are listed but whose permission prompt is refused
    pub fn denied(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Arc::new(devices),
            denied: true,
        }
    }
}

impl MediaSource for StaticSource {
    fn list_capture_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.as_ref().clone()
    }

    fn acquire_track(
        &self,
        device: &DeviceDescriptor,
    ) -> impl Future<Output = Result<Track, MediaAcquisitionError>> + Send {
        let result = if self.denied {
            Err(MediaAcquisitionError::PermissionDenied)
        } else if self.devices.iter().any(|d| d.device_id == device.device_id) {
            Ok(Track::camera(format!(
                "{}-{}",
                device.device_id,
                nanoid::nanoid!(6)
            )))
        } else {
            Err(MediaAcquisitionError::DeviceNotFound(device.device_id.clone()))
        };
        std::future::ready(result)
    }
}
