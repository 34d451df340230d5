use core::fmt;

/// Platform-specific error details.
///
/// The display service reports failures as raw status codes; those are
/// preserved so the process exit status can mirror the underlying failing
/// call. Use [`Display`](fmt::Display) to obtain a human-readable
/// description.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformError {
    /// Raw status code returned by the display service.
    Status(i32),
    Message(&'static str),
}

impl PlatformError {
    /// The raw status code, if this error carries one.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

impl core::error::Error for PlatformError {}

/// The buffer-queue configuration sub-step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    Connect,
    ScalingMode,
    Crop,
    Geometry,
    Usage,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::ScalingMode => "set scaling mode",
            Self::Crop => "set crop",
            Self::Geometry => "set buffer geometry",
            Self::Usage => "set usage",
        })
    }
}

/// Top-level crate error.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The requested pixel format has no display-compatible mapping.
    UnsupportedFormat,
    /// A source frame or mapped region did not match the computed layout.
    LayoutMismatch { expected: usize, actual: usize },
    SurfaceCreation(PlatformError),
    SurfaceConfig(ConfigStep, PlatformError),
    /// `configure_buffers` was called twice without an intervening teardown.
    AlreadyConfigured,
    /// The session has no configured buffer queue (not configured, or torn down).
    NotConfigured,
    Dequeue(PlatformError),
    Map(PlatformError),
    Unmap(PlatformError),
    Submit(PlatformError),
    Cancel(PlatformError),
    Teardown(PlatformError),
    #[cfg(feature = "std")]
    Io(std::io::Error),
}

impl Error {
    /// The raw platform status code behind this error, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::SurfaceCreation(e)
            | Self::SurfaceConfig(_, e)
            | Self::Dequeue(e)
            | Self::Map(e)
            | Self::Unmap(e)
            | Self::Submit(e)
            | Self::Cancel(e)
            | Self::Teardown(e) => e.status(),
            #[cfg(feature = "std")]
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Non-zero process exit code for this error: the magnitude of the
    /// underlying platform status when one exists, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            Some(code) if code != 0 => code.unsigned_abs().min(i32::MAX as u32) as i32,
            _ => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat => f.write_str("unsupported pixel format"),
            Self::LayoutMismatch { expected, actual } => {
                write!(f, "layout mismatch: expected {expected} bytes, got {actual}")
            }
            Self::SurfaceCreation(e) => write!(f, "surface creation failed: {e}"),
            Self::SurfaceConfig(step, e) => write!(f, "surface config failed at {step}: {e}"),
            Self::AlreadyConfigured => f.write_str("buffer queue already configured"),
            Self::NotConfigured => f.write_str("buffer queue not configured"),
            Self::Dequeue(e) => write!(f, "buffer dequeue failed: {e}"),
            Self::Map(e) => write!(f, "buffer map failed: {e}"),
            Self::Unmap(e) => write!(f, "buffer unmap failed: {e}"),
            Self::Submit(e) => write!(f, "buffer submit failed: {e}"),
            Self::Cancel(e) => write!(f, "buffer cancel failed: {e}"),
            Self::Teardown(e) => write!(f, "teardown failed: {e}"),
            #[cfg(feature = "std")]
            Self::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::SurfaceCreation(e)
            | Self::SurfaceConfig(_, e)
            | Self::Dequeue(e)
            | Self::Map(e)
            | Self::Unmap(e)
            | Self::Submit(e)
            | Self::Cancel(e)
            | Self::Teardown(e) => Some(e),
            #[cfg(feature = "std")]
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_propagates_from_platform_payload() {
        let err = Error::Dequeue(PlatformError::Status(-19));
        assert_eq!(err.status(), Some(-19));
        assert_eq!(err.exit_code(), 19);
    }

    #[test]
    fn exit_code_defaults_to_one() {
        assert_eq!(Error::UnsupportedFormat.exit_code(), 1);
        assert_eq!(Error::Map(PlatformError::Message("nope")).exit_code(), 1);
    }

    #[test]
    fn exit_code_saturates_at_extreme_status() {
        let err = Error::Dequeue(PlatformError::Status(i32::MIN));
        assert_eq!(err.exit_code(), i32::MAX);
    }

    #[test]
    fn config_step_in_message() {
        let err = Error::SurfaceConfig(ConfigStep::Crop, PlatformError::Status(-22));
        assert!(err.to_string().contains("set crop"));
    }
}
