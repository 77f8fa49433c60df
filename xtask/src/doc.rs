use anyhow::Result;
use colored::Colorize;

use crate::step::{cargo, OnFailure};

/// Driver crates, bottom layer first.
const CRATES: [&str; 3] = ["platform", "gdma", "stream"];

pub fn run(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Documenting the driver crates...".cyan().bold());
    println!();

    cargo("Building rustdoc", &rustdoc_args(false), OnFailure::Abort)?;

    // Doc examples are `no_run`; compiling them catches API drift.
    cargo(
        "Compiling doc examples",
        &["test", "--doc", "-p", "gdma", "-p", "stream"],
        OnFailure::Warn,
    )?;

    if open {
        cargo("Opening docs", &rustdoc_args(true), OnFailure::Warn)?;
    } else {
        for krate in CRATES {
            println!("   {}", format!("target/doc/{krate}/index.html").dimmed());
        }
        println!("   {}", "Or run 'cargo run -p xtask -- doc --open'".dimmed());
        println!();
    }

    Ok(())
}

fn rustdoc_args(open: bool) -> Vec<&'static str> {
    let mut args = vec!["doc", "--no-deps", "--features", "stream/tracing"];
    for krate in CRATES {
        args.extend(["-p", krate]);
    }
    if open {
        args.push("--open");
    }
    args
}
