//! `lotledger` binary entry point

use clap::Parser;
use env_logger::{Builder, Env};
use lotledger_cli::{Cli, Dispatcher, Session};
use std::process;

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let session = match Session::new(&cli) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error initializing session: {:#}", e);
            process::exit(1);
        }
    };

    let mut dispatcher = Dispatcher::new(session);
    match dispatcher.execute(&cli) {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if cli.verbose {
                for cause in e.chain().skip(1) {
                    eprintln!("Caused by: {}", cause);
                }
            }
            process::exit(1);
        }
    }
}
