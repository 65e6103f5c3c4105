mod cli;
mod commands;
mod env_loader;
mod error;
mod triage;

use std::process::ExitCode;

fn main() -> ExitCode {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
