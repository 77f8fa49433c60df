use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, OnFailure};

/// The ESP32-P4 application cores.
const TARGET: &str = "riscv32imafc-unknown-none-elf";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking driver builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    // no_std build of every driver crate, with and without defmt.
    for krate in ["platform", "gdma", "stream"] {
        cargo(
            &format!("Checking {krate} ({TARGET})"),
            &["check", "-p", krate, "--target", TARGET],
            OnFailure::Abort,
        )?;
    }
    cargo(
        &format!("Checking stream with defmt ({TARGET})"),
        &["check", "-p", "stream", "--target", TARGET, "--features", "defmt"],
        OnFailure::Abort,
    )?;

    // Host build with tracing, the way the tests and simulators use it.
    cargo(
        "Checking stream with tracing (host)",
        &["check", "-p", "stream", "--features", "tracing"],
        OnFailure::Abort,
    )?;

    cargo(
        "Running clippy lints",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        OnFailure::Warn,
    )?;

    if cargo(
        "Checking code formatting",
        &["fmt", "--all", "--check"],
        OnFailure::Warn,
    )?
    .is_none()
    {
        eprintln!("     Run 'cargo fmt --all' to fix");
    }

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
