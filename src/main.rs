use registry_gc::cli::{Args, Runner};
use registry_gc::logging::init_tracing;
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse_args().from_env();
    init_tracing(args.verbose, args.quiet);

    let runner = Runner::new(args);
    if let Err(e) = runner.run().await {
        eprintln!("Error: {}", e);
        process::exit(if e.is_usage_error() { 2 } else { 1 });
    }
}
