// SPDX-License-Identifier: GPL-3.0-or-later

//! CLI harness (spec.md §6): load an image, run it to completion, print one
//! of three post-halt views. Everything else — parsing program arguments,
//! reading the file, wiring up logging — lives here; the library never
//! touches `std::env`/`std::io` directly.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tpc_vm::platform::StdPlatform;
use tpc_vm::{Platform, VmConfig};

/// Runs a TPC bytecode image.
#[derive(Parser)]
#[command(name = "tpc-vm", version, about)]
struct Cli {
    /// Print the halted exit code instead of the default memory dump.
    #[arg(short = 'e', long = "exit")]
    exit: bool,

    /// Dump the first 128 bytes of the heap alongside the other segments.
    #[arg(short = 'm', long = "mem", conflicts_with = "full_mem")]
    mem: bool,

    /// Dump the entire heap region alongside the other segments.
    ///
    /// clap's derive only binds single-character short flags, so the
    /// original two-letter `-fm` is exposed as `--fm`/`--full-mem` instead
    /// (see DESIGN.md Open Questions).
    #[arg(long = "full-mem", alias = "fm")]
    full_mem: bool,

    /// Path to the TPC image file.
    program: std::path::PathBuf,

    /// Arguments passed through to the program as `argv` (native `main_args`).
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let mut platform = StdPlatform::new();
    let bytes = match platform.read_file(&cli.program) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("tpc-vm: cannot read {}: {e}", cli.program.display());
            std::process::exit(1);
        }
    };

    let config = VmConfig::new(tpc_vm::types::Width::W64);
    let mut vm = match tpc_vm::load(&bytes, config, cli.args) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("tpc-vm: failed to load image: {e}");
            std::process::exit(1);
        }
    };

    vm.run(&mut platform);

    if cli.mem {
        dump_memory(&vm, 128);
    } else if cli.full_mem {
        let heap_len = vm.mem.len() - vm.mem.heap_start;
        dump_memory(&vm, heap_len);
    } else if cli.exit {
        println!("exit code {}", vm.exit_code());
    } else {
        // No flag given: the exit code is still the harness's default view.
        println!("exit code {}", vm.exit_code());
    }

    if vm.error.is_some() {
        std::process::exit(1);
    }
}

/// Prints every segment's byte range as hex, plus `heap_bytes` bytes of the
/// heap starting at `heap_start` (spec.md §6 `-m`/`-fm`).
fn dump_memory(vm: &tpc_vm::Vm, heap_bytes: usize) {
    let mem = &vm.mem;
    dump_segment("stack", mem.as_slice(), 0, mem.stack_end);
    dump_segment("global", mem.as_slice(), mem.stack_end, mem.global_end);
    dump_segment("literal", mem.as_slice(), mem.global_end, mem.literal_end);
    dump_segment("class_header", mem.as_slice(), mem.literal_end, mem.class_header_end);
    dump_segment("functions", mem.as_slice(), mem.class_header_end, mem.functions_end);
    dump_segment("entry", mem.as_slice(), mem.functions_end, mem.entry_end);

    let heap_end = std::cmp::min(mem.heap_start + heap_bytes, mem.len());
    dump_segment("heap", mem.as_slice(), mem.heap_start, heap_end);
}

fn dump_segment(name: &str, bytes: &[u8], start: usize, end: usize) {
    println!("{name} [{start}..{end})");
    for chunk in bytes[start..end].chunks(16) {
        let line: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("  {}", line.join(" "));
    }
}
