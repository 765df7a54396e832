// SPDX-License-Identifier: GPL-3.0-or-later

//! A register-based bytecode virtual machine: instruction dispatch over a
//! flat linear memory, a native call table, a bump-pointer heap, and a
//! precise mark-and-compact garbage collector.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod gc;
pub mod heap;
pub mod image;
pub mod imagebuilder;
pub mod memory;
pub mod native;
pub mod opcode;
pub mod platform;
pub mod register;
pub mod types;
pub mod vm;

pub use config::VmConfig;
pub use error::{LoadError, VmError};
pub use platform::{Platform, RecordingPlatform, StdPlatform};
pub use vm::Vm;

/// Loads an image and constructs a ready-to-run [`Vm`] in one call.
pub fn load(bytes: &[u8], config: VmConfig, argv: Vec<String>) -> Result<Vm, LoadError> {
    let mem = image::load(bytes, config)?;
    Ok(Vm::new(mem, config, argv))
}
