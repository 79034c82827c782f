//! Console output helpers.

use std::io::Write;

use termcolor::{Color, ColorSpec, WriteColor};

/// Write a line to the console.
///
/// Console write failures are not actionable here and are swallowed.
pub fn echo(out: &mut dyn WriteColor, line: &str) {
    let _ = writeln!(out, "{}", line);
}

/// Write a bold line to the console.
pub fn echo_bold(out: &mut dyn WriteColor, line: &str) {
    let _ = out.set_color(ColorSpec::new().set_bold(true));
    let _ = writeln!(out, "{}", line);
    let _ = out.reset();
}

/// Write a `fatal:` line, with the prefix in red.
pub fn echo_fatal(out: &mut dyn WriteColor, message: &str) {
    let _ = out.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
    let _ = write!(out, "fatal: ");
    let _ = out.reset();
    let _ = writeln!(out, "{}", message);
}
