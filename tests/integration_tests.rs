use std::fs;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("educpu-test-{}-{name}", std::process::id()));
    path
}

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = temp_path(name);
    fs::write(&path, contents).unwrap();
    path
}

fn educpu() -> Command {
    Command::cargo_bin("educpu").unwrap()
}

#[test]
fn no_arguments_shows_usage() {
    educpu().assert().failure();
}

#[test]
fn assemble_then_run_emits_output_byte() {
    let src = write_temp("emit.asm", "LD A,#0x41\nST A,[0xFF]\nHLT\n");
    educpu().arg("asm").arg(&src).arg("--format").arg("hex").assert().success();

    let obj = src.with_extension("hex");
    educpu()
        .arg("run")
        .arg(&obj)
        .assert()
        .success()
        .stdout("A");

    let listing = fs::read_to_string(src.with_extension("lst")).unwrap();
    assert!(listing.contains("LD A,#0x41"));
}

#[test]
fn assemble_writes_raw_binary_by_default() {
    let src = write_temp("bin.asm", "LD A,#37\nADD #28\nHLT\n");
    educpu().arg("asm").arg(&src).assert().success();
    assert_eq!(
        fs::read(src.with_extension("bin")).unwrap(),
        vec![0x00, 0x25, 0x30, 0x1C, 0xA8]
    );
}

#[test]
fn check_rejects_bad_source() {
    let src = write_temp("bad.asm", "MOV A, #1\n");
    educpu().arg("check").arg(&src).assert().failure();
}

#[test]
fn check_passes_good_source() {
    let src = write_temp("good.asm", "NOP\nHLT\n");
    educpu()
        .arg("check")
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 errors"));
}

#[test]
fn run_rejects_overlapping_files() {
    let a = write_temp("ovl-a.hex", ":010010007778\n:00000001FF\n");
    let b = write_temp("ovl-b.hex", ":010010009956\n:00000001FF\n");
    educpu()
        .arg("run")
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Overlap between"))
        .stderr(predicate::str::contains("0x10"));
}

#[test]
fn run_rejects_multiple_raw_binaries() {
    let a = temp_path("multi-a.bin");
    fs::write(&a, [0xA0u8]).unwrap();
    let b = write_temp("multi-b.hex", ":00000001FF\n");
    educpu()
        .arg("run")
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("raw binary"));
}

#[test]
fn runaway_fetch_is_reported() {
    let src = write_temp("runaway.asm", "NOP\n");
    educpu().arg("asm").arg(&src).assert().success();
    educpu()
        .arg("run")
        .arg(src.with_extension("bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "PC entered unloaded memory at address 0x01",
        ));
}

#[test]
fn trace_prints_cpu_state() {
    let src = write_temp("trace.asm", "NOP\nHLT\n");
    educpu().arg("asm").arg(&src).assert().success();
    educpu()
        .arg("run")
        .arg(src.with_extension("bin"))
        .arg("--trace")
        .assert()
        .success()
        .stderr(predicate::str::contains("PC=00 OP=A0"))
        .stderr(predicate::str::contains("Halted after 2 cycles."));
}

#[test]
fn cycle_limit_is_enforced() {
    let src = write_temp("spin.asm", "loop: JMP loop\n");
    educpu().arg("asm").arg(&src).assert().success();
    educpu()
        .arg("run")
        .arg(src.with_extension("bin"))
        .arg("--max-cycles")
        .arg("5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max cycles (5) reached"));
}
