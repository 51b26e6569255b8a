//! `authwatch subscribe` command handler
//!
//! Connects a [`ClientMultiplexer`], joins one consumer and prints each event
//! as a single JSON line until Ctrl-C (or `--count` events), then unsubscribes.

use std::future::Future;
use std::io::Write;

use tracing::{info, warn};

use authwatch_core::config::AuthWatchConfig;
use authwatch_core::event::AuthEvent;
use authwatch_rpc::{ClientMultiplexer, MultiplexerSettings};

use crate::cli::SubscribeArgs;
use crate::error::CliError;

/// Run the `subscribe` command against stdout until Ctrl-C.
pub async fn run(args: SubscribeArgs, config: &AuthWatchConfig) -> Result<(), CliError> {
    let settings = settings(&args, config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let printed = execute(settings, args.count, ctrl_c, &mut out).await?;
    eprintln!("Done! {printed} events received.");
    Ok(())
}

/// Multiplexer settings from the configuration plus command-line overrides.
pub fn settings(
    args: &SubscribeArgs,
    config: &AuthWatchConfig,
) -> Result<MultiplexerSettings, CliError> {
    let mut settings = MultiplexerSettings::from_core(&config.client)?;
    if let Some(host) = &args.callback_host {
        settings.callback_host = host.clone();
    }
    if let Some(len) = args.history_len {
        settings.history_len = len;
    }
    settings.validate()?;
    Ok(settings)
}

/// Subscribe and write events to `out` until `shutdown` resolves or `limit`
/// events have been written. Returns the number of events written.
///
/// The subscription is always removed from the server before returning.
pub async fn execute<W, F>(
    settings: MultiplexerSettings,
    limit: Option<usize>,
    shutdown: F,
    out: &mut W,
) -> Result<usize, CliError>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mux = ClientMultiplexer::connect(settings).await?;
    info!(
        callback = %mux.callback_addr(),
        history = mux.history().len(),
        total_events = mux.event_count(),
        "subscribed to auth events"
    );

    let mut stream = mux.join();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    let result = loop {
        if limit.is_some_and(|limit| printed >= limit) {
            break Ok(());
        }
        tokio::select! {
            () = &mut shutdown => break Ok(()),
            event = stream.next() => match event {
                Some(event) => {
                    if let Err(e) = write_event(out, &event) {
                        break Err(e);
                    }
                    printed += 1;
                }
                None => break Ok(()),
            },
        }
    };

    drop(stream);
    eprintln!("Unsubscribing...");
    if let Err(e) = mux.shutdown().await {
        warn!(error = %e, "failed to unsubscribe cleanly");
    }

    result.map(|()| printed)
}

fn write_event<W: Write>(out: &mut W, event: &AuthEvent) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, event)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_apply_overrides() {
        let args = SubscribeArgs {
            count: None,
            callback_host: Some("10.0.0.5".to_owned()),
            history_len: Some(20),
        };
        let settings = settings(&args, &AuthWatchConfig::default()).expect("valid");
        assert_eq!(settings.callback_host, "10.0.0.5");
        assert_eq!(settings.history_len, 20);
        assert_eq!(settings.server_url, "http://localhost:7080");
    }

    #[test]
    fn test_settings_reject_zero_history() {
        let args = SubscribeArgs {
            history_len: Some(0),
            ..SubscribeArgs::default()
        };
        let err = settings(&args, &AuthWatchConfig::default()).expect_err("invalid");
        assert_eq!(err.exit_code(), 2);
    }
}
