use std::process::ExitCode;

fn main() -> ExitCode {
    benefits_cli::run()
}
