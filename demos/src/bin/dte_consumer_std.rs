//! Consumes messages from a durable topic endpoint addressed as `topic://<topic>`
//!
//! The source terminus is marked durable with `durable = configuration` and
//! `expiry-policy = never`. The link name is the DTE name.

use std::process::ExitCode;

use clap::Parser;
use dte_demos::{init_tracing, run_dte_consumer, DteArgs};
use fe2o3_amqp_dte::terminus::DurableStyle;

#[derive(Parser, Debug)]
#[command(name = "dte_consumer_std")]
#[command(about = "Consumes messages from a Durable Topic Endpoint (DTE) with standard terminus attributes")]
struct Cli {
    #[command(flatten)]
    dte: DteArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    run_dte_consumer(cli.dte, DurableStyle::TopicTerminus).await
}
