//! External tool invocation.

use super::error::{CompileError, CompileResult};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

/// Run `program` with `args`, feeding `input` on stdin and returning stdout.
///
/// A non-zero exit becomes [`CompileError::ProcessInvocation`] carrying the
/// tool's stderr. A tool that cannot be spawned surfaces as an I/O error.
pub fn run_tool<S: AsRef<str>>(program: &Path, args: &[S], input: &[u8]) -> CompileResult<Vec<u8>> {
    let tool = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    log::trace!(
        "running {} {}",
        program.display(),
        args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
    );

    let mut child = Command::new(program)
        .args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to run {}: {}", program.display(), e))
        })?;

    // Feed stdin from a separate thread so a chatty tool cannot deadlock us.
    let mut stdin = child.stdin.take();
    let input = input.to_vec();
    let writer = thread::spawn(move || -> std::io::Result<()> {
        if let Some(stdin) = stdin.as_mut() {
            stdin.write_all(&input)?;
        }
        Ok(())
    });

    let output = child.wait_with_output()?;
    match writer.join() {
        Ok(Ok(())) => {}
        // A tool that exits early closes its stdin; the exit status says why.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(CompileError::ProcessInvocation {
                tool,
                code: None,
                stderr: "stdin writer panicked".to_string(),
            })
        }
    }

    if !output.status.success() {
        return Err(CompileError::ProcessInvocation {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }
    Ok(output.stdout)
}
