//! Consumes messages from a durable topic endpoint addressed as `dsub://<topic>`

use std::process::ExitCode;

use clap::Parser;
use dte_demos::{init_tracing, run_dte_consumer, DteArgs};
use fe2o3_amqp_dte::terminus::DurableStyle;

#[derive(Parser, Debug)]
#[command(name = "dte_consumer")]
#[command(about = "Consumes messages from a Durable Topic Endpoint (DTE)")]
struct Cli {
    #[command(flatten)]
    dte: DteArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    run_dte_consumer(cli.dte, DurableStyle::SubscriptionPrefix).await
}
