//! Fatal error reporting for the binary

use crate::error::StepLineError;
use tracing::error;

/// Report `error` and exit with its status code
///
/// With `verbose >= 1` the full cause chain is printed as well.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    let exit_code = match error.downcast_ref::<StepLineError>() {
        Some(err) => {
            eprintln!("{}", err.user_message());
            err.exit_code()
        }
        None => {
            eprintln!("Error: {error}");
            1
        }
    };

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code)
}
