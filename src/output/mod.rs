mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{bright, dim};
pub use summary::render_summary;

use styling::magenta_bold;

/// Prints the cqlens banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 cqlens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Commit Queue attempt insights")
    );
}
