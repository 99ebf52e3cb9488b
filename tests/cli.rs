//! End-to-end CLI test (spec §4.10/§6): invokes the built `splc` binary
//! against a real file on disk and checks exit code, stdout, and `-o`.

use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn splc() -> Command {
  Command::new(env!("CARGO_BIN_EXE_splc"))
}

#[test]
fn compiles_a_file_and_writes_nasm_to_stdout() {
  let dir = tempdir().unwrap();
  let src_path = dir.path().join("prog.spl");
  fs::write(&src_path, "fn main(): Unit { print(1 + 2); }").unwrap();

  let output = splc().arg(&src_path).output().unwrap();
  assert!(output.status.success());
  let stdout = String::from_utf8(output.stdout).unwrap();
  assert!(stdout.contains("global splmain"));
}

#[test]
fn writes_to_the_output_file_when_given() {
  let dir = tempdir().unwrap();
  let src_path = dir.path().join("prog.spl");
  let out_path = dir.path().join("prog.asm");
  fs::write(&src_path, "fn main(): Unit { print(1); }").unwrap();

  let status = splc().arg(&src_path).arg("-o").arg(&out_path).status().unwrap();
  assert!(status.success());
  let written = fs::read_to_string(&out_path).unwrap();
  assert!(written.contains("section .text"));
}

#[test]
fn a_semantic_error_exits_nonzero_with_a_diagnostic_on_stderr() {
  let dir = tempdir().unwrap();
  let src_path = dir.path().join("bad.spl");
  fs::write(&src_path, "fn main(): Int { return y; }").unwrap();

  let output = splc().arg(&src_path).output().unwrap();
  assert!(!output.status.success());
  let stderr = String::from_utf8(output.stderr).unwrap();
  assert!(!stderr.is_empty());
}

#[test]
fn a_missing_source_file_is_an_io_error() {
  let output = splc().arg("/nonexistent/path/does/not/exist.spl").output().unwrap();
  assert!(!output.status.success());
}
