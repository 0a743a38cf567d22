use clap::Parser;
use leasebridge::{
    Args, BridgeError, ClientConfig, DhcpInstance, Fact, HostHandle, HostSignal, LeaseSession,
    SocketEngine,
};
use std::{error::Error as StdError, process::ExitCode};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to build runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), BridgeError> {
    let engine = SocketEngine::new(ClientConfig::new());
    let (host, mut signals) = HostHandle::channel();

    let mut instance = DhcpInstance::new(
        &args.to_values(),
        &engine,
        &tokio::runtime::Handle::current(),
        &mut rand::rng(),
        host,
    )?;
    tracing::info!("Waiting for a lease on {}", instance.ifname());

    let result = loop {
        let stepped = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            stepped = instance.step() => Some(stepped),
        };

        match stepped {
            None => {
                tracing::info!("Interrupted, shutting down");
                instance.die();
                break Ok(());
            }
            Some(Ok(true)) => report_signals(&instance, &mut signals),
            Some(Ok(false)) => break Ok(()),
            Some(Err(e)) => break Err(e),
        }
    };

    report_signals(&instance, &mut signals);
    result
}

fn report_signals<S: LeaseSession>(
    instance: &DhcpInstance<S>,
    signals: &mut UnboundedReceiver<HostSignal>,
) {
    while let Ok(signal) = signals.try_recv() {
        tracing::info!("Instance signalled {:?}", signal);
        if signal == HostSignal::Up {
            for fact in Fact::ALL {
                match instance.fact(fact) {
                    Ok(value) => tracing::info!("  {} = {:?}", fact.name(), value),
                    Err(e) => tracing::warn!("  {} unavailable: {}", fact.name(), e),
                }
            }
        }
    }
}

fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
