//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in the core library and the CLI must not block the
//! runtime. Use `tokio::fs`, `tokio::net` and `reqwest` async clients.
//!
//! Blocking calls stay acceptable in plain `fn`s (configuration is loaded
//! before any stream starts) and in test code.

use architectural_enforcement::{production_sources, Violation};

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("use std::fs", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("use std::net", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::thread::sleep", "Thread sleep"),
];

fn find_blocking_io_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (number, code) in file.production_lines() {
            for &(pattern, kind) in FORBIDDEN {
                if !code.contains(pattern) {
                    continue;
                }
                // Imports apply file-wide; calls only matter inside async fns
                if pattern.starts_with("use ") || file.in_async_fn(number) {
                    violations.push(Violation {
                        path: file.path.clone(),
                        line: number,
                        kind,
                        text: code.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Production async code does not block.
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async production code:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse instead:");
        eprintln!("  - tokio::fs::read_to_string().await, tokio::fs::write().await");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - reqwest::Client (async)");
        eprintln!("  - tokio::time::sleep().await / tokio::time::timeout()");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}
