#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed. Failed checks alone never change the exit code.
    ThresholdsFailed = 11,

    /// Setup (instructor registration/login) failed; no iteration ran.
    SetupFailed = 20,

    /// Invalid CLI/options input, unreadable fixture or results file.
    InvalidInput = 30,

    /// Internal/runtime error (IO errors writing results, task panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_thresholds(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}
