//! The compact wire-level status/error enum from the registration and
//! message-response surfaces.

/// Status code carried on the wire (`FsResponse.status`, `UpdateResponse.status`)
/// and returned by the registration API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    NoStructFound = 1,
    InvalidPointer = 2,
    StructAlreadyPresent = 3,
    AllocFailed = 4,
    GeneralFail = 5,
    UpdateFailed = 6,
    InvalidParameter = 7,
    NotInitialized = 8,
    NotFound = 9,
}

impl StatusCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::NoStructFound),
            2 => Some(Self::InvalidPointer),
            3 => Some(Self::StructAlreadyPresent),
            4 => Some(Self::AllocFailed),
            5 => Some(Self::GeneralFail),
            6 => Some(Self::UpdateFailed),
            7 => Some(Self::InvalidParameter),
            8 => Some(Self::NotInitialized),
            9 => Some(Self::NotFound),
            _ => None,
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for raw in 0u8..=9 {
            let code = StatusCode::from_u8(raw).unwrap();
            assert_eq!(code as u8, raw);
        }
    }

    #[test]
    fn unknown_byte_is_none() {
        assert!(StatusCode::from_u8(200).is_none());
    }
}
