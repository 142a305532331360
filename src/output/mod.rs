mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::write_json;
pub use progress::WaitProgress;
pub use summary::{print_jobs, render_finished};

use styling::{brand, label};

/// Prints the `openqa-client` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        brand("🧪 openqa-client"),
        label(env!("CARGO_PKG_VERSION")),
        label("openQA API client")
    );
}
