/// Returns the platform tag of the host this binary was compiled for.
///
/// Used when the packaging frontend did not pass `--plat-name`. The values
/// follow what the Python packaging tools report for the same host.
pub fn native_tag() -> String {
    normalize_tag(&host_platform())
}

/// Normalizes a platform string the way wheel tags are spelled
/// (`macosx-11.0-arm64` becomes `macosx_11_0_arm64`).
pub fn normalize_tag(platform: &str) -> String {
    platform.replace(['.', '-'], "_")
}

fn host_platform() -> String {
    // 32-bit Windows has its own spelling rather than `win-<arch>`
    #[cfg(all(target_os = "windows", target_arch = "x86"))]
    {
        "win32".to_string()
    }
    #[cfg(not(all(target_os = "windows", target_arch = "x86")))]
    {
        format!("{}-{}", detect_os(), detect_arch())
    }
}

#[cfg_attr(all(target_os = "windows", target_arch = "x86"), allow(dead_code))]
fn detect_os() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        #[cfg(target_arch = "aarch64")]
        {
            "macosx-11.0"
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            "macosx-10.9"
        }
    }
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "win"
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        std::env::consts::OS
    }
}

#[cfg_attr(all(target_os = "windows", target_arch = "x86"), allow(dead_code))]
fn detect_arch() -> &'static str {
    #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
    {
        "amd64"
    }
    #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
    {
        "x86_64"
    }
    #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
    {
        "aarch64"
    }
    #[cfg(all(target_arch = "aarch64", not(target_os = "linux")))]
    {
        "arm64"
    }
    #[cfg(target_arch = "x86")]
    {
        "i686"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")))]
    {
        std::env::consts::ARCH
    }
}
