use log::error;

use clap::Parser;

mod args;
mod report;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match report::generate_report(&args) {
        Ok(outcome) => {
            println!("Report successfully generated as: {}", outcome.output_path);
            println!(
                "Initial record size: {}. Cleaned record size: {}.",
                outcome.initial_rows, outcome.cleaned_rows
            );
        }
        Err(e) => {
            // The full chain goes to the log; the operator gets one line.
            error!("report generation failed: {:?}", e);
            eprintln!("An error occurred: {}", e);
            std::process::exit(1);
        }
    }
}
