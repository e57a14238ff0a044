use std::process::ExitCode;

fn main() -> ExitCode {
    mova_cli::run()
}
