use std::process::ExitCode;

fn main() -> ExitCode {
    packsmith_lib::run()
}
