//! Receives messages from a node and prints their bodies

use std::process::ExitCode;

use clap::Parser;
use dte_demos::{config_error, init_tracing, report, shutdown_on_ctrl_c, Auth, PrintSink};
use fe2o3_amqp_dte::{
    amqp::AmqpConnector,
    session::{ReceiverOptions, ReceiverSession},
    Endpoint,
};

#[derive(Parser, Debug)]
#[command(name = "simple_recv")]
#[command(about = "Receives messages from a broker node")]
struct Cli {
    /// amqp message broker host url
    #[arg(short, long, default_value = "localhost:5672")]
    url: String,

    /// node address from which messages are received. Use no prefix or
    /// `queue://` for a queue, `topic://` for a topic
    #[arg(short, long, default_value = "examples")]
    address: String,

    /// number of messages to receive; 0 receives indefinitely
    #[arg(short, long, default_value_t = 100)]
    messages: u64,

    #[command(flatten)]
    auth: Auth,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let builder = Endpoint::builder().url(cli.url).address(cli.address);
    let endpoint = match cli.auth.apply(builder).build() {
        Ok(endpoint) => endpoint,
        Err(err) => return config_error(err),
    };
    let options = ReceiverOptions::new(cli.messages);

    let shutdown = shutdown_on_ctrl_c();
    let result =
        match ReceiverSession::open(AmqpConnector::default(), endpoint, options, PrintSink).await {
            Ok(mut session) => session.run(shutdown).await,
            Err(err) => Err(err),
        };
    report(result, &format!("received all {} messages", cli.messages))
}
