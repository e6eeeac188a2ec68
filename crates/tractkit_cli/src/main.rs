//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `tractkit_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("tractkit_core version={}", tractkit_core::core_version());
    println!(
        "tractkit_core default_log_level={}",
        tractkit_core::default_log_level()
    );
}
