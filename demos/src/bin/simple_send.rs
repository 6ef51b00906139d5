//! Sends messages to a node and waits until every one is confirmed

use std::process::ExitCode;

use clap::Parser;
use dte_demos::{config_error, init_tracing, report, shutdown_on_ctrl_c, Auth};
use fe2o3_amqp_dte::{
    amqp::AmqpConnector,
    session::{SenderOptions, SenderSession},
    Endpoint, Qos,
};

#[derive(Parser, Debug)]
#[command(name = "simple_send")]
#[command(about = "Sends messages to a broker node")]
struct Cli {
    /// amqp message broker host url
    #[arg(short, long, default_value = "localhost:5672")]
    url: String,

    /// node address to which messages are sent
    #[arg(short, long, default_value = "examples")]
    address: String,

    /// number of messages to send
    #[arg(short, long, default_value_t = 100)]
    messages: u64,

    #[command(flatten)]
    auth: Auth,

    /// selects message QoS (persistent or non-persistent)
    #[arg(short, long, default_value = "non-persistent")]
    qos: Qos,
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
    let options = SenderOptions::new(cli.messages).qos(cli.qos);

    let shutdown = shutdown_on_ctrl_c();
    let result = match SenderSession::open(AmqpConnector::default(), endpoint, options).await {
        Ok(mut session) => session.run(shutdown).await,
        Err(err) => Err(err),
    };
    report(result, "all messages confirmed")
}
