use std::sync::Arc;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wepp_status::adapters::{ReqwestHttpClient, TungsteniteConnector};
use wepp_status::cli::{
    handle_version_command, parse_args, socket_config, CliCommand, TailOptions, TerminalPanel,
    USAGE,
};
use wepp_status::preflight::PreflightMonitor;
use wepp_status::stacktrace::HttpJobInfoFetcher;
use wepp_status::status_stream::{StatusStream, StatusStreamOptions};
use wepp_status::websocket::ChannelHub;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wepp_status=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let options = match parse_args(std::env::args()) {
        CliCommand::Version => handle_version_command(),
        CliCommand::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        CliCommand::Invalid(message) => {
            eprintln!("Error: {}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
        CliCommand::Tail(options) => options,
    };

    color_eyre::install()?;
    init_tracing();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(tail(options))
}

async fn tail(options: TailOptions) -> Result<()> {
    let config = socket_config(&options)?;
    let hub = ChannelHub::new(config.clone(), Arc::new(TungsteniteConnector::new()));
    let panel = Arc::new(TerminalPanel::stdout());

    let stream = match &options.channel {
        Some(channel) => {
            let fetcher = Arc::new(HttpJobInfoFetcher::from_config(
                ReqwestHttpClient::new(),
                &config,
            ));
            let stream = StatusStream::attach(
                &hub,
                StatusStreamOptions::new(panel.clone(), options.run_id.clone(), channel.clone())
                    .with_stacktrace(panel.clone(), fetcher)
                    .on_trigger(|trigger| {
                        info!(event = %trigger.event, "Trigger");
                    }),
            )?;
            Some(stream)
        }
        None => None,
    };

    let preflight = if options.preflight {
        Some(PreflightMonitor::attach(&hub, &options.run_id)?)
    } else {
        None
    };

    let printer = preflight.as_ref().map(|monitor| {
        let mut updates = monitor.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                println!(
                    "-- preflight: done [{}] locked [{}]",
                    state.completed().join(", "),
                    state.locked().join(", ")
                );
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("failed to listen for Ctrl-C: {}", e))?;
    info!("Interrupted, disconnecting");

    if let Some(task) = printer {
        task.abort();
    }
    hub.disconnect_all();
    drop(stream);
    drop(preflight);
    Ok(())
}
