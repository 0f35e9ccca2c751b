use clap::Parser;
use frame_batch::cli;
use tracing::error;

fn main() {
    let args = cli::Args::parse();
    match cli::dispatch(args) {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(err) => {
            if tracing::dispatcher::has_been_set() {
                error!("{:#}", err);
            } else {
                eprintln!("error: {:#}", err);
            }
            std::process::exit(1);
        }
    }
}
