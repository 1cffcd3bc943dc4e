//! Platform keys (`<arch>-<os>`) and entry-point naming.

use std::fmt;

/// Every name the toolchain entry point can take in an install directory.
pub const ENTRY_POINT_NAMES: [&str; 2] = ["zig", "zig.exe"];

/// Architecture-OS pair selecting an artifact within a version entry.
///
/// # Example
///
/// ```
/// use zup_schema::Platform;
///
/// let target = Platform::new("x86_64-windows");
/// assert_eq!(target.entry_point_name(), "zig.exe");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform(String);

impl Platform {
    /// Wrap an explicit platform key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key of the machine we are running on, e.g. `aarch64-macos`.
    pub fn host() -> Self {
        Self(format!(
            "{}-{}",
            std::env::consts::ARCH,
            std::env::consts::OS
        ))
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key names a Windows target (case-insensitive).
    pub fn is_windows(&self) -> bool {
        self.0.to_ascii_lowercase().contains("windows")
    }

    /// File name of the toolchain executable for this platform.
    pub fn entry_point_name(&self) -> &'static str {
        if self.is_windows() {
            ENTRY_POINT_NAMES[1]
        } else {
            ENTRY_POINT_NAMES[0]
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
