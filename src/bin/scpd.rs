#![deny(unsafe_code)]

use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let status = scpd_daemon::cli::run(env::args_os());
    ExitCode::from(status.clamp(0, i32::from(u8::MAX)) as u8)
}
