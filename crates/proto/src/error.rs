//! Codec-level failures. These are the "wire errors" of the base error
//! taxonomy: the engine's dispatch loop matches on them and drops the
//! frame rather than reporting them upstream.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    #[error("frame shorter than its mode's fixed header")]
    ShortFrame,
    #[error("leading mode byte does not match any known mode")]
    UnknownMode,
    #[error("fragment received out of the expected ascending sequence")]
    BadFragment,
}
