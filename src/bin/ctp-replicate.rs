#![deny(unsafe_code)]

use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    ctp_cli::init_diagnostics();

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    ExitCode::from(ctp_cli::run(env::args_os(), &mut stdout, &mut stderr))
}
