//! Debug disassembly of compiled code objects.
//!
//! Advisory only: nothing in the compile path depends on it.

use crate::core::{run_tool, CompileResult, Config};

/// Label of the padding emitted after the last kernel; pure noise in listings.
pub const EPILOGUE_MARKER: &str = "s_code_end";

/// Drop every line mentioning the epilogue marker.
pub fn filter_listing(listing: &str) -> String {
    listing
        .lines()
        .filter(|line| !line.contains(EPILOGUE_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Disassemble `lib` with `llvm-objdump` and return the filtered listing.
pub fn disassemble_to_string(lib: &[u8], config: &Config) -> CompileResult<String> {
    let objdump = config.llvm_tool("llvm-objdump");
    let listing = run_tool(&objdump, &["-d", "-"], lib)?;
    Ok(filter_listing(&String::from_utf8_lossy(&listing)))
}

/// Print the disassembly of `lib` to stdout.
pub fn disassemble(lib: &[u8], config: &Config) -> CompileResult<()> {
    println!("{}", disassemble_to_string(lib, config)?);
    Ok(())
}
