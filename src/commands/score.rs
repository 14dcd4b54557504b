//! `thunt score <hunt>`: the subprocess the monitor launches.

use crate::{score::compute_score, treasure::HuntId};
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;

/// Print the summary line and return the exit code the monitor checks.
pub fn run_score(root: &Path, hunt: &HuntId, out: &mut impl Write) -> u8 {
    match compute_score(root, hunt) {
        Ok(summary) => {
            if let Some(corruption) = summary.corruption {
                warn!(
                    %hunt,
                    complete = corruption.complete_records,
                    trailing = corruption.trailing_bytes,
                    "score covers complete records only"
                );
            }
            match writeln!(out, "{summary}").and_then(|()| out.flush()) {
                Ok(()) => EXIT_OK,
                Err(err) => {
                    eprintln!("Failed to write score: {err}");
                    EXIT_FAILED
                }
            }
        }
        Err(err) => {
            eprintln!("Failed to compute score for hunt '{hunt}': {err}");
            EXIT_FAILED
        }
    }
}
