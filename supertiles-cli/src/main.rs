//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

#[expect(clippy::print_stderr, reason = "fatal errors are reported on the console")]
fn main() {
    if let Err(err) = supertiles_cli::run() {
        eprintln!("supertiles: {err}");
        std::process::exit(1);
    }
}
