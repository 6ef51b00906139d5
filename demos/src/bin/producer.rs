//! Publishes messages to a topic

use std::process::ExitCode;

use clap::Parser;
use dte_demos::{config_error, init_tracing, report, shutdown_on_ctrl_c};
use fe2o3_amqp_dte::{
    amqp::AmqpConnector,
    session::{SenderOptions, SenderSession},
    terminus::topic_address,
    Endpoint,
};

#[derive(Parser, Debug)]
#[command(name = "producer")]
#[command(about = "Publishes messages to a topic")]
struct Cli {
    /// Url to connect to amqp broker
    #[arg(short, long, default_value = "amqp://localhost:5672")]
    url: String,

    /// Topic to publish to
    #[arg(short, long, default_value = "a/topic")]
    topic: String,

    /// number of messages to send
    #[arg(short, long, default_value_t = 100)]
    messages: u64,
}

fn hello(id: u64) -> String {
    format!("hello {}", id - 1)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let endpoint = match Endpoint::builder()
        .url(cli.url)
        .address(topic_address(&cli.topic))
        .build()
    {
        Ok(endpoint) => endpoint,
        Err(err) => return config_error(err),
    };
    let options = SenderOptions::new(cli.messages).payload(hello);

    let shutdown = shutdown_on_ctrl_c();
    let result = match SenderSession::open(AmqpConnector::default(), endpoint, options).await {
        Ok(mut session) => session.run(shutdown).await,
        Err(err) => Err(err),
    };
    report(result, "confirmed all messages")
}
