//! A CLI frontend for the photogrid service.

mod cli;
mod output;

fn main() {
    if let Err(error) = cli::execute() {
        photogrid_service::logging::ensure_log_error(&error);
        std::process::exit(1);
    }
}
