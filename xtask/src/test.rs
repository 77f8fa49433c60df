use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, OnFailure};

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();

    if !integration_only {
        let output = cargo(
            "Unit tests",
            &["test", "--lib", "--workspace"],
            OnFailure::Abort,
        )?;
        print_summary(output.as_ref());
    }

    if !unit_only {
        // tests/ of platform, gdma and stream: mock-platform contracts,
        // allocator properties and the stream handoff.
        let output = cargo(
            "Integration tests",
            &["test", "--tests", "--workspace", "--exclude", "xtask"],
            OnFailure::Abort,
        )?;
        print_summary(output.as_ref());
    }

    let output = cargo(
        "Doc tests",
        &["test", "--doc", "--workspace"],
        OnFailure::Warn,
    )?;
    print_summary(output.as_ref());

    println!(
        "{}",
        format!(
            "✓ All tests completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

fn print_summary(output: Option<&std::process::Output>) {
    if let Some(output) = output {
        let summary = extract_test_summary(&String::from_utf8_lossy(&output.stdout));
        println!("    {}", summary.dimmed());
        println!();
    }
}

fn extract_test_summary(output: &str) -> String {
    // Look for lines like "test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out"
    let mut passed = 0u64;
    let mut failed = 0u64;
    let mut found = false;
    for line in output.lines() {
        let Some(summary) = line.split("test result:").nth(1) else {
            continue;
        };
        found = true;
        for part in summary.split(';') {
            let mut words = part.split_whitespace().rev();
            let (Some(kind), Some(count)) = (words.next(), words.next()) else {
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                continue;
            };
            match kind {
                "passed" => passed = passed.saturating_add(count),
                "failed" => failed = failed.saturating_add(count),
                _ => {}
            }
        }
    }
    if found {
        format!("{passed} passed; {failed} failed")
    } else {
        "(summary not available)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_of_all_binaries_are_added_up() {
        let output = "\
test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
test result: ok. 12 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out";
        assert_eq!(extract_test_summary(output), "17 passed; 1 failed");
    }

    #[test]
    fn missing_summary_is_reported() {
        assert_eq!(extract_test_summary("nothing here"), "(summary not available)");
    }
}
