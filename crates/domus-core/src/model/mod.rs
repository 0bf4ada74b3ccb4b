// ── Domain model ──

pub mod device;
pub mod path;
pub mod state;

pub use device::{ControlMode, Device, DeviceId, DeviceKind};
pub use path::StorePath;
pub use state::{CommandId, DisplayState, Preset, PresetValues, is_truthy, parse_percent};
