use std::process::ExitCode;

fn main() -> ExitCode {
    echelon_cli::run()
}
