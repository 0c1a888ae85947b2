//! Per-file result lines and the final summary.

/// Outcome of validating one entry.
pub enum Verdict {
    /// Coordinates (and content CRC, where possible) check out.
    Pass,
    /// Something did not match; the reason is printed.
    Fail(&'static str),
    /// Entry cannot be validated without decompression.
    Skip(&'static str),
}

/// Prints one `PASS|FAIL|SKIP` line for a file.
pub fn print_line(path: &str, verdict: &Verdict) {
    match verdict {
        Verdict::Pass => println!("PASS {}", path),
        Verdict::Fail(reason) => println!("FAIL {} ({})", path, reason),
        Verdict::Skip(reason) => println!("SKIP {} ({})", path, reason),
    }
}

/// Prints the final counts.
pub fn print_summary(passed: usize, failed: usize, skipped: usize) {
    println!(
        "{} passed, {} failed, {} skipped",
        passed, failed, skipped
    );
}
