//! Log output setup.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG` plus `level`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case that subscriber stays in charge.
pub fn init(level: LevelFilter) -> bool {
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
