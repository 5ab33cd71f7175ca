//! Status codes shared by every layer.
//!
//! Mirrors the closed set from the original C stack (`NET_STATUS_OK`,
//! `NET_EAGAIN`, ...) one-to-one so the wire-level behavior documented
//! against those names stays legible from this side.

/// Outcome of a layer operation that is not a plain success.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i8)]
pub enum Status {
    /// Frame was not addressed to this session; caller should retry.
    EAgain = -1,
    /// The driver could not accept all the bytes it was given.
    ENoMem = -2,
    /// A declared length exceeded the bytes actually available.
    EOverflow = -3,
    /// A feature or code path is not supported by this stack.
    EInval = -4,
    /// Structural wire-format violation.
    EProto = -5,
    /// Invalid configuration supplied at `connect` time.
    EConfig = -6,
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Status::EAgain => "EAGAIN",
            Status::ENoMem => "ENOMEM",
            Status::EOverflow => "EOVERFLOW",
            Status::EInval => "EINVAL",
            Status::EProto => "EPROTO",
            Status::EConfig => "ECONFIG",
        };
        f.write_str(s)
    }
}

/// Result alias used by every layer's `recv`/`send`.
pub type NetResult<T> = Result<T, Status>;
