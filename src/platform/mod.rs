//! Platform-specific process helpers.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::*;

pub fn current_pid() -> u32 {
    std::process::id()
}
