mod align;
mod split;

use std::fmt::Display;
use colored::{Colorize, ColoredString};
use crate::{Error, err::error};

pub(crate) const PROGRAM: &'static str = env!("CARGO_PKG_NAME");

/// Print tool version and authors.
pub(crate) fn print_version() {
    println!("{} {}", PROGRAM.underline(), format!("v{}", env!("CARGO_PKG_VERSION")).green());
    let authors: Vec<_> = env!("CARGO_PKG_AUTHORS").split(':').collect();
    let n = authors.len();
    if n == 0 {
        return;
    }
    print!("Created by ");
    for (i, author) in authors.iter().enumerate() {
        if i == 0 {
            print!("{}", author.bright_blue());
        } else if i < n - 1 {
            print!(", {}", author.bright_blue());
        } else {
            print!(" and {}", author.bright_blue());
        }
    }
    println!();
}

/// Formats default value for the help message.
pub(crate) fn fmt_def(val: impl Display) -> ColoredString {
    val.to_string().cyan()
}

/// Formats optional default value, `None` is shown as `auto`.
pub(crate) fn fmt_def_opt<T: Display>(val: &Option<T>) -> ColoredString {
    match val {
        Some(v) => fmt_def(v),
        None => fmt_def("auto"),
    }
}

/// Placeholder in the help message, used for flags without values.
pub(crate) fn flag() -> ColoredString {
    "    ".normal()
}

/// Logs program version at the start of the run.
pub(crate) fn greet() {
    log::info!("{} v{}", PROGRAM.underline(), env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    print_version();
    println!("\n{} {} command [arguments]",
        "Usage:".bold(), PROGRAM);

    println!("\n{}", "[ Spliced alignment ]".bold());
    println!("    {:<7}  Align RNA-seq reads to the genome and discover splice junctions.", "align".red());
    println!("    {:<7}  Split reads into fixed-length segments.", "split".red());

    println!("\n{}", "[ General help ]".bold());
    println!("    {:<7}  Show this help message.", "help".red());
    println!("    {:<7}  Show version.", "version".red());
}

pub fn run(argv: &[String]) -> Result<(), Error> {
    if argv.len() <= 1 {
        print_help();
        std::process::exit(1);
    }
    match &argv[1] as &str {
        "align" => align::run(&argv[2..])?,
        "split" => split::run(&argv[2..])?,
        "help" | "h" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-V" => print_version(),
        cmd => return Err(error!(InvalidInput, "Unknown command {} (see {} help)", cmd, PROGRAM)),
    }
    Ok(())
}
