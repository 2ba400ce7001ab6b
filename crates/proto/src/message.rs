//! Bit-exact, native-endian, packed wire layouts for the seven message
//! kinds and the mode-tag dispatcher. All multi-byte integers are
//! native-endian; every header below is packed with no padding, matching
//! a single embedded device and its co-located host sharing endianness
//! by construction.

use crate::error::ProtoError;

/// The 1-byte mode tag that opens every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Online = 0,
    Offline = 1,
    VariableGet = 2,
    VariableSet = 3,
    Monitor = 4,
    Update = 5,
    Fs = 6,
}

impl Mode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Online),
            1 => Some(Self::Offline),
            2 => Some(Self::VariableGet),
            3 => Some(Self::VariableSet),
            4 => Some(Self::Monitor),
            5 => Some(Self::Update),
            6 => Some(Self::Fs),
            _ => None,
        }
    }
}

/// Firmware update sub-operation, `UpdateRequest.update_op` /
/// `UpdateResponse.update_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateOp {
    Start = 0,
    Data = 1,
    End = 2,
}

impl UpdateOp {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Start),
            1 => Some(Self::Data),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

/// File-system sub-operation, `FsRequest.fs_op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FsOp {
    List = 0,
    Write = 1,
    Append = 2,
    Read = 3,
    Rename = 4,
    Delete = 5,
    Upload = 6,
    Download = 7,
}

impl FsOp {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::List),
            1 => Some(Self::Write),
            2 => Some(Self::Append),
            3 => Some(Self::Read),
            4 => Some(Self::Rename),
            5 => Some(Self::Delete),
            6 => Some(Self::Upload),
            7 => Some(Self::Download),
            _ => None,
        }
    }
}

/// Fixed byte size of the common `mode + device_id` prefix every frame opens with.
pub const COMMON_PREFIX_SIZE: usize = 3;

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn need(buf: &[u8], len: usize) -> Result<(), ProtoError> {
    if buf.len() < len {
        Err(ProtoError::ShortFrame)
    } else {
        Ok(())
    }
}

/// `VariableGet`/`VariableSet` share this header shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableHeader {
    pub device_id: u16,
    pub total_fragments: u8,
    pub fragment_number: u8,
    pub struct_id: u16,
    pub struct_offset: u16,
    pub variable_size: u16,
}

impl VariableHeader {
    pub const SIZE: usize = COMMON_PREFIX_SIZE + 1 + 1 + 2 + 2 + 2;

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        need(buf, Self::SIZE)?;
        Ok(Self {
            device_id: read_u16(buf, 1),
            total_fragments: buf[3],
            fragment_number: buf[4],
            struct_id: read_u16(buf, 5),
            struct_offset: read_u16(buf, 7),
            variable_size: read_u16(buf, 9),
        })
    }

    pub fn encode(&self, mode: Mode, out: &mut [u8]) -> Result<usize, ProtoError> {
        need(out, Self::SIZE)?;
        out[0] = mode as u8;
        out[1..3].copy_from_slice(&self.device_id.to_ne_bytes());
        out[3] = self.total_fragments;
        out[4] = self.fragment_number;
        out[5..7].copy_from_slice(&self.struct_id.to_ne_bytes());
        out[7..9].copy_from_slice(&self.struct_offset.to_ne_bytes());
        out[9..11].copy_from_slice(&self.variable_size.to_ne_bytes());
        Ok(Self::SIZE)
    }
}

/// `VariableSet`: a `VariableHeader` followed by the data slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSetFrame {
    pub header: VariableHeader,
    pub data: Vec<u8>,
}

impl VariableSetFrame {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        let header = VariableHeader::decode(buf)?;
        need(buf, VariableHeader::SIZE + header.variable_size as usize)?;
        let data = buf[VariableHeader::SIZE..VariableHeader::SIZE + header.variable_size as usize]
            .to_vec();
        Ok(Self { header, data })
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtoError> {
        let written = self.header.encode(Mode::VariableSet, out)?;
        need(out, written + self.data.len())?;
        out[written..written + self.data.len()].copy_from_slice(&self.data);
        Ok(written + self.data.len())
    }
}

/// `Monitor`: text log frame, fragmentable like `VariableSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorFrame {
    pub device_id: u16,
    pub total_fragments: u8,
    pub fragment_number: u8,
    pub text: Vec<u8>,
}

impl MonitorFrame {
    pub const HEADER_SIZE: usize = COMMON_PREFIX_SIZE + 1 + 1 + 2;

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        need(buf, Self::HEADER_SIZE)?;
        let msg_len = read_u16(buf, 5) as usize;
        need(buf, Self::HEADER_SIZE + msg_len)?;
        Ok(Self {
            device_id: read_u16(buf, 1),
            total_fragments: buf[3],
            fragment_number: buf[4],
            text: buf[Self::HEADER_SIZE..Self::HEADER_SIZE + msg_len].to_vec(),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtoError> {
        need(out, Self::HEADER_SIZE + self.text.len())?;
        out[0] = Mode::Monitor as u8;
        out[1..3].copy_from_slice(&self.device_id.to_ne_bytes());
        out[3] = self.total_fragments;
        out[4] = self.fragment_number;
        out[5..7].copy_from_slice(&(self.text.len() as u16).to_ne_bytes());
        out[Self::HEADER_SIZE..Self::HEADER_SIZE + self.text.len()].copy_from_slice(&self.text);
        Ok(Self::HEADER_SIZE + self.text.len())
    }
}

/// Inbound firmware-update request. `Start`/`End` carry `data_size` as
/// metadata only (for `Start`, the announced total transfer size) with
/// no trailing payload bytes; only `Data` actually carries `data[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub device_id: u16,
    pub update_op: UpdateOp,
    pub seq: u32,
    pub crc: u32,
    pub data_size: u32,
    pub data: Vec<u8>,
}

impl UpdateRequest {
    pub const HEADER_SIZE: usize = COMMON_PREFIX_SIZE + 1 + 4 + 4 + 4;

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        need(buf, Self::HEADER_SIZE)?;
        let update_op = UpdateOp::from_u8(buf[3]).ok_or(ProtoError::UnknownMode)?;
        let data_size = read_u32(buf, 12);
        let data = if update_op == UpdateOp::Data {
            need(buf, Self::HEADER_SIZE + data_size as usize)?;
            buf[Self::HEADER_SIZE..Self::HEADER_SIZE + data_size as usize].to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            device_id: read_u16(buf, 1),
            update_op,
            seq: read_u32(buf, 4),
            crc: read_u32(buf, 8),
            data_size,
            data,
        })
    }
}

/// Outbound firmware-update acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResponse {
    pub device_id: u16,
    pub update_op: UpdateOp,
    pub status: u8,
    pub crc: u32,
    pub seq: u32,
}

impl UpdateResponse {
    pub const SIZE: usize = COMMON_PREFIX_SIZE + 1 + 1 + 4 + 4;

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtoError> {
        need(out, Self::SIZE)?;
        out[0] = Mode::Update as u8;
        out[1..3].copy_from_slice(&self.device_id.to_ne_bytes());
        out[3] = self.update_op as u8;
        out[4] = self.status;
        out[5..9].copy_from_slice(&self.crc.to_ne_bytes());
        out[9..13].copy_from_slice(&self.seq.to_ne_bytes());
        Ok(Self::SIZE)
    }
}

/// Inbound file-system request. `data_size` is overloaded by operation,
/// matching the source: for `Upload` the actual trailing `data[]` length
/// is authoritative (whatever bytes are left after the path), while for
/// `Download` (which carries no trailing payload) it is reused as the
/// requested read size, `0` meaning "remainder of file".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsRequest {
    pub device_id: u16,
    pub fs_op: FsOp,
    pub offset: u32,
    pub requested_size: u32,
    pub path: Vec<u8>,
    pub data: Vec<u8>,
}

impl FsRequest {
    pub const HEADER_SIZE: usize = COMMON_PREFIX_SIZE + 1 + 2 + 4 + 4;

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        need(buf, Self::HEADER_SIZE)?;
        let fs_op = FsOp::from_u8(buf[3]).ok_or(ProtoError::UnknownMode)?;
        let path_len = read_u16(buf, 4) as usize;
        let offset = read_u32(buf, 6);
        let requested_size = read_u32(buf, 10);
        need(buf, Self::HEADER_SIZE + path_len)?;
        let path = buf[Self::HEADER_SIZE..Self::HEADER_SIZE + path_len].to_vec();
        let data = buf[Self::HEADER_SIZE + path_len..].to_vec();
        Ok(Self {
            device_id: read_u16(buf, 1),
            fs_op,
            offset,
            requested_size,
            path,
            data,
        })
    }

    /// Builds a request frame (the host-side counterpart of `decode`,
    /// used by request-issuing callers such as `Engine::fs_list`).
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtoError> {
        let total = Self::HEADER_SIZE + self.path.len() + self.data.len();
        need(out, total)?;
        out[0] = Mode::Fs as u8;
        out[1..3].copy_from_slice(&self.device_id.to_ne_bytes());
        out[3] = self.fs_op as u8;
        out[4..6].copy_from_slice(&(self.path.len() as u16).to_ne_bytes());
        out[6..10].copy_from_slice(&self.offset.to_ne_bytes());
        out[10..14].copy_from_slice(&self.requested_size.to_ne_bytes());
        let path_start = Self::HEADER_SIZE;
        out[path_start..path_start + self.path.len()].copy_from_slice(&self.path);
        let data_start = path_start + self.path.len();
        out[data_start..data_start + self.data.len()].copy_from_slice(&self.data);
        Ok(total)
    }
}

/// Outbound file-system response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsResponse {
    pub device_id: u16,
    pub fs_op: FsOp,
    pub status: u8,
    pub data: Vec<u8>,
}

impl FsResponse {
    pub const HEADER_SIZE: usize = COMMON_PREFIX_SIZE + 1 + 1 + 4;

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, ProtoError> {
        need(out, Self::HEADER_SIZE + self.data.len())?;
        out[0] = Mode::Fs as u8;
        out[1..3].copy_from_slice(&self.device_id.to_ne_bytes());
        out[3] = self.fs_op as u8;
        out[4] = self.status;
        out[5..9].copy_from_slice(&(self.data.len() as u32).to_ne_bytes());
        out[Self::HEADER_SIZE..Self::HEADER_SIZE + self.data.len()].copy_from_slice(&self.data);
        Ok(Self::HEADER_SIZE + self.data.len())
    }
}

/// A decoded inbound frame, classified by its mode byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Online { device_id: u16 },
    Offline { device_id: u16 },
    VariableGet(VariableHeader),
    VariableSet(VariableSetFrame),
    Monitor(MonitorFrame),
    Update(UpdateRequest),
    Fs(FsRequest),
}

impl InboundFrame {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        need(buf, COMMON_PREFIX_SIZE)?;
        let mode = Mode::from_u8(buf[0]).ok_or(ProtoError::UnknownMode)?;
        let device_id = read_u16(buf, 1);
        match mode {
            Mode::Online => Ok(Self::Online { device_id }),
            Mode::Offline => Ok(Self::Offline { device_id }),
            Mode::VariableGet => Ok(Self::VariableGet(VariableHeader::decode(buf)?)),
            Mode::VariableSet => Ok(Self::VariableSet(VariableSetFrame::decode(buf)?)),
            Mode::Monitor => Ok(Self::Monitor(MonitorFrame::decode(buf)?)),
            Mode::Update => Ok(Self::Update(UpdateRequest::decode(buf)?)),
            Mode::Fs => Ok(Self::Fs(FsRequest::decode(buf)?)),
        }
    }
}
