//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on I/O, channels or timeouts. It never
//! sleeps to poll for state. Silent streams are bounded with
//! `tokio::time::timeout`, not a sleep loop.
//!
//! Test code may sleep to pace scripted servers.

use architectural_enforcement::{production_sources, Violation};

const SLEEPS: &[&str] = &["thread::sleep", "time::sleep", "sleep_until"];

fn find_sleep_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (number, code) in file.production_lines() {
            if SLEEPS.iter().any(|pattern| code.contains(pattern)) {
                violations.push(Violation {
                    path: file.path.clone(),
                    line: number,
                    kind: "Sleep in production code",
                    text: code.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Production code does not sleep.
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on a channel, a watch, a stream or tokio::time::timeout instead.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
