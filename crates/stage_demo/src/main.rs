mod app;

use std::process::ExitCode;

use tracing::error;

fn main() -> ExitCode {
    match app::bootstrap::build_show() {
        Ok(show) => app::show_runner::run(show),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
