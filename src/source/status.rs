//! Camera SDK status classification.
//!
//! libgphoto2 reports failures as negative integers. Zero and positive values mean
//! success. Every failing call is turned into an `SdkError` carrying the call site and
//! the text of the call, so a fatal diagnostic names exactly which SDK operation failed.

pub const GP_OK: i32 = 0;
pub const GP_ERROR_CORRUPTED_DATA: i32 = -102;
pub const GP_ERROR_FILE_EXISTS: i32 = -103;
pub const GP_ERROR_MODEL_NOT_FOUND: i32 = -105;
pub const GP_ERROR_DIRECTORY_NOT_FOUND: i32 = -107;
pub const GP_ERROR_CAMERA_BUSY: i32 = -110;
pub const GP_ERROR_CANCEL: i32 = -112;
pub const GP_ERROR_CAMERA_ERROR: i32 = -113;
pub const GP_ERROR_OS_FAILURE: i32 = -114;

/// Classified failure of a camera SDK call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SdkStatus {
    CorruptedData,
    FileExists,
    ModelNotFound,
    DirectoryNotFound,
    CameraBusy,
    Cancel,
    CameraError,
    OsFailure,
    Unknown(i32),
}

impl SdkStatus {
    /// Classify a raw SDK return code. `None` means the call succeeded.
    pub fn classify(code: i32) -> Option<Self> {
        if code >= GP_OK {
            return None;
        }
        Some(match code {
            GP_ERROR_CORRUPTED_DATA => Self::CorruptedData,
            GP_ERROR_FILE_EXISTS => Self::FileExists,
            GP_ERROR_MODEL_NOT_FOUND => Self::ModelNotFound,
            GP_ERROR_DIRECTORY_NOT_FOUND => Self::DirectoryNotFound,
            GP_ERROR_CAMERA_BUSY => Self::CameraBusy,
            GP_ERROR_CANCEL => Self::Cancel,
            GP_ERROR_CAMERA_ERROR => Self::CameraError,
            GP_ERROR_OS_FAILURE => Self::OsFailure,
            other => Self::Unknown(other),
        })
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::CorruptedData => GP_ERROR_CORRUPTED_DATA,
            Self::FileExists => GP_ERROR_FILE_EXISTS,
            Self::ModelNotFound => GP_ERROR_MODEL_NOT_FOUND,
            Self::DirectoryNotFound => GP_ERROR_DIRECTORY_NOT_FOUND,
            Self::CameraBusy => GP_ERROR_CAMERA_BUSY,
            Self::Cancel => GP_ERROR_CANCEL,
            Self::CameraError => GP_ERROR_CAMERA_ERROR,
            Self::OsFailure => GP_ERROR_OS_FAILURE,
            Self::Unknown(code) => *code,
        }
    }

    /// Busy and cancelled calls can succeed when repeated; everything else is a hard failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CameraBusy | Self::Cancel)
    }
}

impl std::fmt::Display for SdkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptedData => f.write_str("Corrupted data"),
            Self::FileExists => f.write_str("File exists"),
            Self::ModelNotFound => f.write_str("Model not found"),
            Self::DirectoryNotFound => f.write_str("Directory not found"),
            Self::CameraBusy => f.write_str("Busy"),
            Self::Cancel => f.write_str("Canceled"),
            Self::CameraError => f.write_str("Camera error"),
            Self::OsFailure => f.write_str("OS failure"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Source location of an SDK call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub module: &'static str,
}

/// A failed SDK call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdkError {
    pub status: SdkStatus,
    pub call_site: CallSite,
    /// Source text of the failed call.
    pub operation: &'static str,
}

impl std::fmt::Display for SdkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sdk call failed @ {}:{} ({}): {} -> {}",
            self.call_site.file,
            self.call_site.line,
            self.call_site.module,
            self.operation,
            self.status
        )
    }
}

impl std::error::Error for SdkError {}

/// Turn a raw return code into `Ok(code)` or a classified `SdkError`.
pub fn check_status(
    code: i32,
    call_site: CallSite,
    operation: &'static str,
) -> Result<i32, SdkError> {
    match SdkStatus::classify(code) {
        None => Ok(code),
        Some(status) => Err(SdkError {
            status,
            call_site,
            operation,
        }),
    }
}

/// Evaluate an SDK call and classify its return code, recording where it was made.
///
/// FFI calls are written as `sdk_check!(unsafe { ... })` at the call site; the operation
/// text records the call without the `unsafe` wrapper. The macro itself never opens an
/// unsafe block around a safe-looking call:
///
/// ```compile_fail,E0133
/// unsafe fn capture_preview() -> i32 {
///     0
/// }
/// let _ = dslr_webcam::sdk_check!(capture_preview());
/// ```
#[macro_export]
macro_rules! sdk_check {
    (@classify $code:expr, $operation:expr) => {{
        let code: i32 = $code;
        $crate::source::status::check_status(
            code,
            $crate::source::status::CallSite {
                file: file!(),
                line: line!(),
                module: module_path!(),
            },
            $operation,
        )
    }};
    (unsafe { $call:expr }) => {
        $crate::sdk_check!(@classify unsafe { $call }, stringify!($call))
    };
    ($call:expr) => {
        $crate::sdk_check!(@classify $call, stringify!($call))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_are_not_errors() {
        assert_eq!(SdkStatus::classify(GP_OK), None);
        assert_eq!(SdkStatus::classify(1), None);
        assert_eq!(SdkStatus::classify(4096), None);
    }

    #[test]
    fn classification_table_matches_sdk_codes() {
        let table = [
            (-102, SdkStatus::CorruptedData, "Corrupted data"),
            (-103, SdkStatus::FileExists, "File exists"),
            (-105, SdkStatus::ModelNotFound, "Model not found"),
            (-107, SdkStatus::DirectoryNotFound, "Directory not found"),
            (-110, SdkStatus::CameraBusy, "Busy"),
            (-112, SdkStatus::Cancel, "Canceled"),
            (-113, SdkStatus::CameraError, "Camera error"),
            (-114, SdkStatus::OsFailure, "OS failure"),
        ];
        for (code, status, reason) in table {
            assert_eq!(SdkStatus::classify(code), Some(status));
            assert_eq!(status.code(), code);
            assert_eq!(status.to_string(), reason);
        }
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        let status = SdkStatus::classify(-1).unwrap();
        assert_eq!(status, SdkStatus::Unknown(-1));
        assert_eq!(status.to_string(), "unknown(-1)");
        assert_eq!(status.code(), -1);
    }

    #[test]
    fn only_busy_and_cancel_are_transient() {
        assert!(SdkStatus::CameraBusy.is_transient());
        assert!(SdkStatus::Cancel.is_transient());
        for status in [
            SdkStatus::CorruptedData,
            SdkStatus::FileExists,
            SdkStatus::ModelNotFound,
            SdkStatus::DirectoryNotFound,
            SdkStatus::CameraError,
            SdkStatus::OsFailure,
            SdkStatus::Unknown(-60),
        ] {
            assert!(!status.is_transient(), "{status:?} must be fatal");
        }
    }

    fn fake_capture(code: i32) -> i32 {
        code
    }

    #[test]
    fn sdk_check_records_call_site_and_operation() {
        let err = sdk_check!(fake_capture(GP_ERROR_CAMERA_BUSY)).unwrap_err();
        assert_eq!(err.status, SdkStatus::CameraBusy);
        assert_eq!(err.operation, "fake_capture(GP_ERROR_CAMERA_BUSY)");
        assert!(err.call_site.file.ends_with("status.rs"));
        assert!(err.call_site.module.ends_with("source::status::tests"));

        let line = err.to_string();
        assert!(line.contains("fake_capture(GP_ERROR_CAMERA_BUSY) -> Busy"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn sdk_check_passes_success_through() {
        assert_eq!(sdk_check!(fake_capture(3)), Ok(3));
    }

    /// Stands in for an FFI entry point.
    unsafe fn raw_capture(code: i32) -> i32 {
        code
    }

    #[test]
    fn unsafe_calls_are_explicit_and_recorded_without_wrapper() {
        // SAFETY: raw_capture has no preconditions.
        let err = sdk_check!(unsafe { raw_capture(GP_ERROR_CAMERA_ERROR) }).unwrap_err();
        assert_eq!(err.status, SdkStatus::CameraError);
        assert_eq!(err.operation, "raw_capture(GP_ERROR_CAMERA_ERROR)");

        // SAFETY: as above.
        assert_eq!(sdk_check!(unsafe { raw_capture(GP_OK) }), Ok(GP_OK));
    }
}
