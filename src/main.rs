use clap::Parser;
use sasu_sim::api::{Cli, Command, run_compute, run_http_server};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("sasu_sim=info"))
        .init();

    match Cli::parse().command {
        Command::Compute(args) => {
            let report = match run_compute(args) {
                Ok(report) => report,
                Err(e) => {
                    eprintln!("Input error: {e}");
                    std::process::exit(1);
                }
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Output error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Serve(args) => {
            if let Err(e) = run_http_server(args).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
