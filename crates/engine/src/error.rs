//! Usage and resource errors from the registry and engine surface.
//! Mirrors the wire-level [`StatusCode`] so a Rust-level `Result` and
//! the compact enum callers put on the wire stay in lockstep.

use thiserror::Error;
use tst_proto::status::StatusCode;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("a device with this name is already registered")]
    DuplicateDevice,
    #[error("an interface with this name is already registered on this device")]
    DuplicateInterface,
    #[error("a struct with this name is already registered on this device")]
    DuplicateStruct,
    #[error("no device registered under this name")]
    UnknownDevice,
    #[error("no interface registered under this name on this device")]
    UnknownInterface,
    #[error("no struct registered under this name on this device")]
    UnknownStruct,
    #[error("the requested offset/length falls outside the registered region")]
    RegionOutOfBounds,
    #[error("the engine has not been initialized with a device yet")]
    NotInitialized,
}

impl From<EngineError> for StatusCode {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DuplicateDevice
            | EngineError::DuplicateInterface
            | EngineError::DuplicateStruct => StatusCode::StructAlreadyPresent,
            EngineError::UnknownDevice
            | EngineError::UnknownInterface
            | EngineError::UnknownStruct => StatusCode::NoStructFound,
            EngineError::RegionOutOfBounds => StatusCode::InvalidPointer,
            EngineError::NotInitialized => StatusCode::NotInitialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_matching_status() {
        let status: StatusCode = EngineError::UnknownStruct.into();
        assert_eq!(status, StatusCode::NoStructFound);
    }
}
