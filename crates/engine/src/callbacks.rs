//! File-system and firmware-update hooks the host installs on an
//! [`crate::engine::Engine`] at boot. Plain, non-async traits: the base
//! protocol requires every entry point to return without blocking, so a
//! hook is expected to do its work synchronously (or hand off to
//! something else and report back on a later tick).

use tst_proto::status::StatusCode;

pub trait FsHandler {
    fn list(&mut self, path: &str) -> Result<Vec<u8>, StatusCode>;
    fn upload(&mut self, path: &str, data: &[u8], offset: u32) -> Result<(), StatusCode>;
    fn download(&mut self, path: &str, offset: u32, size: u32) -> Result<Vec<u8>, StatusCode>;
    fn delete(&mut self, path: &str) -> Result<(), StatusCode>;
}

pub trait UpdateHandler {
    fn start(&mut self, total_size: u32) -> StatusCode;
    fn data(&mut self, seq: u32, data: &[u8]) -> StatusCode;
    fn end(&mut self) -> StatusCode;
}
