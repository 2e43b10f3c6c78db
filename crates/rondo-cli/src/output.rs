//! Terminal output helpers.

use console::style;

/// Print an informational line.
pub fn info(message: &str) {
    println!("{message}");
}

/// Print a success line.
pub fn success(message: &str) {
    println!("{} {message}", style("ok:").green().bold());
}

/// Print a warning line.
pub fn warning(message: &str) {
    eprintln!("{} {message}", style("warning:").yellow().bold());
}

/// Print an error line.
pub fn error(message: &str) {
    eprintln!("{} {message}", style("error:").red().bold());
}
