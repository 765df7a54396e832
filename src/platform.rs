//! Host dependency seam (spec.md §6 "Native environment dependencies"): a
//! monotonic clock and wide-character-capable stdout, kept behind a trait
//! so [`crate::vm::Vm`] never touches `std::io`/`std::time` directly.
//! Mirrors the teacher's `platform::Platform` split between a production
//! implementation and a host-testable recording one.

use std::io::Write;
use std::time::Instant;

/// Everything the native call table (spec.md §4.3) needs from the host.
pub trait Platform {
    /// Monotonic time in platform-defined units (native id 3, `clock`).
    fn clock(&mut self) -> i64;

    /// Writes UTF-16 code units to stdout, without a trailing newline.
    fn print_str(&mut self, chars: &[u16]);

    /// Writes UTF-16 code units to stdout, with a trailing newline.
    fn println_str(&mut self, chars: &[u16]) {
        self.print_str(chars);
        self.print_str(&[u16::from(b'\n')]);
    }

    /// Reads an entire file's bytes, for the CLI harness's image loader.
    fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>>;
}

/// Production implementation: wall-clock time since process start, stdout
/// via `std::io::Write`, ordinary filesystem reads.
pub struct StdPlatform {
    start: Instant,
}

impl StdPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StdPlatform {
    fn clock(&mut self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    fn print_str(&mut self, chars: &[u16]) {
        let text = String::from_utf16_lossy(chars);
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Test double that records output instead of touching stdio, mirroring
/// the teacher's mock virtual-address-space platform.
#[derive(Default)]
pub struct RecordingPlatform {
    pub clock_ticks: i64,
    pub output: Vec<u16>,
    pub files: std::collections::HashMap<std::path::PathBuf, Vec<u8>>,
}

impl Platform for RecordingPlatform {
    fn clock(&mut self) -> i64 {
        self.clock_ticks += 1;
        self.clock_ticks
    }

    fn print_str(&mut self, chars: &[u16]) {
        self.output.extend_from_slice(chars);
    }

    fn read_file(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_platform_buffers_output_without_stdio() {
        let mut p = RecordingPlatform::default();
        p.print_str(&[72, 105]);
        assert_eq!(String::from_utf16(&p.output).unwrap(), "Hi");
    }

    #[test]
    fn recording_platform_clock_advances() {
        let mut p = RecordingPlatform::default();
        let a = p.clock();
        let b = p.clock();
        assert!(b > a);
    }
}
