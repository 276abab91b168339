//! Stress tests for connection and session failover.
//!
//! ## What We Test
//!
//! - **High volume**: hundreds of thousands of operations on a healthy connection
//! - **Failover churn**: invalidations racing with operations on many sessions
//! - **Registry hygiene**: dropped and closed sessions never linger
//! - **Resource cleanup**: at most one live connection, none after close


/// Utility: Memory usage statistics
#[cfg(target_os = "macos")]
pub fn get_memory_usage_mb() -> f64 {
    use std::process::Command;
    let output = Command::new("ps")
        .args(["-o", "rss=", "-p", &std::process::id().to_string()])
        .output()
        .expect("failed to get memory usage");

    let rss_kb = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0);

    rss_kb / 1024.0
}

#[cfg(not(target_os = "macos"))]
pub fn get_memory_usage_mb() -> f64 {
    0.0
}
