mod frame;
mod reply;
mod version;

pub use frame::{
    BinaryFrame, BundleKind, EventFrame, EventFrameKind, FrameError, ZIP_MAGIC,
};
pub use reply::{Precondition, Reply};
pub use version::{ProtocolVersion, VersionParseError};
