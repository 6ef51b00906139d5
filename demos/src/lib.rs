//! Helpers shared by the demo binaries

use std::process::ExitCode;

use clap::Args;
use fe2o3_amqp_dte::{
    amqp::AmqpConnector,
    config::{Builder, ConfigError},
    constants::DEFAULT_CONTAINER_ID_PREFIX,
    receiver::MessageSink,
    session::{ReceiverOptions, ReceiverSession},
    terminus::DurableStyle,
    Completion, Endpoint, InboundMessage, SessionError, SubscriptionMode,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the RUST_LOG environment variable.
///
/// Defaults to "info" level if RUST_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Returns a token that is cancelled on Ctrl-C
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), token.clone()));
    token
}

/// Cancels `trigger` once `signal` fires
///
/// A signal handler that cannot be installed leaves the token alone, the
/// sessions then run until they finish on their own.
async fn cancel_on_signal(
    signal: impl std::future::Future<Output = std::io::Result<()>>,
    trigger: CancellationToken,
) {
    match signal.await {
        Ok(()) => {
            tracing::info!("Interrupted");
            trigger.cancel();
        }
        Err(err) => tracing::warn!(error = %err, "Ctrl-C handler unavailable"),
    }
}

/// Username and password flags
#[derive(Args, Debug, Clone)]
pub struct Auth {
    /// username for authentication
    #[arg(short = 'o', long)]
    pub username: Option<String>,

    /// password for authentication
    #[arg(short = 'p', long)]
    pub password: Option<String>,
}

impl Auth {
    /// Applies the credentials to an endpoint builder. No username selects
    /// anonymous authentication.
    pub fn apply(self, builder: Builder) -> Builder {
        builder.optional_credentials(self.username, self.password)
    }
}

/// Prints the body of every delivered message
#[derive(Debug, Default)]
pub struct PrintSink;

impl MessageSink for PrintSink {
    fn deliver(&mut self, message: &InboundMessage) {
        println!("{}", message.payload);
    }
}

/// Reports an invalid endpoint configuration
pub fn config_error(err: ConfigError) -> ExitCode {
    eprintln!("Invalid configuration: {}", err);
    ExitCode::FAILURE
}

/// Prints the outcome of a session and maps it to the exit status
///
/// `done` is printed when the session completed its work.
pub fn report(result: Result<Completion, SessionError>, done: &str) -> ExitCode {
    match result {
        Ok(Completion::AllConfirmed { rejected, .. }) => {
            if rejected > 0 {
                tracing::warn!(rejected, "Some deliveries were rejected");
            }
            println!("{}", done);
            ExitCode::SUCCESS
        }
        Ok(Completion::AllReceived { .. }) => {
            println!("{}", done);
            ExitCode::SUCCESS
        }
        Ok(Completion::Interrupted) => ExitCode::SUCCESS,
        Ok(Completion::Disconnected) => {
            println!("Disconnected");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("Transport error: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Flags of the durable topic endpoint consumers
#[derive(Args, Debug, Clone)]
pub struct DteArgs {
    /// Url to connect to amqp broker
    #[arg(short, long, default_value = "amqp://localhost:5672")]
    pub url: String,

    /// Topic for the DTE
    #[arg(short, long, default_value = "a/topic")]
    pub topic: String,

    /// DTE name
    #[arg(short = 'n', long = "dte-name", alias = "dte_name", default_value = "mydte")]
    pub dte_name: String,

    /// number of messages to receive
    #[arg(short, long, default_value_t = 100)]
    pub messages: u64,

    #[command(flatten)]
    pub auth: Auth,
}

/// Receives from the durable topic endpoint named by `args`
///
/// The subscription outlives the process, messages published while it is not
/// running are delivered on the next start.
pub async fn run_dte_consumer(args: DteArgs, style: DurableStyle) -> ExitCode {
    // Brokers may scope the subscription to the container id, keep it stable
    let connector =
        AmqpConnector::default().container_id(format!("{}-{}", DEFAULT_CONTAINER_ID_PREFIX, args.dte_name));
    let builder = Endpoint::builder()
        .url(args.url)
        .address(args.topic)
        .subscription_name(args.dte_name);
    let endpoint = match args.auth.apply(builder).build() {
        Ok(endpoint) => endpoint,
        Err(err) => return config_error(err),
    };
    let options =
        ReceiverOptions::new(args.messages).mode(SubscriptionMode::DurableTopicEndpoint(style));

    println!("waiting to receive {} messages", args.messages);
    let shutdown = shutdown_on_ctrl_c();
    let result =
        match ReceiverSession::open(connector, endpoint, options, PrintSink).await {
            Ok(mut session) => session.run(shutdown).await,
            Err(err) => Err(err),
        };
    report(result, "Received all messages")
}
