//! `authwatch ping` command handler

use std::io::Write;
use std::time::Instant;

use serde::Serialize;

use authwatch_rpc::RpcClient;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `ping` command.
pub async fn execute(client: &RpcClient, writer: &OutputWriter) -> Result<(), CliError> {
    let report = ping(client).await?;
    writer.render(&report)
}

/// Ping the server and measure the round trip.
pub async fn ping(client: &RpcClient) -> Result<PingReport, CliError> {
    let started = Instant::now();
    let reply = client.ping().await?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if reply != "pong" {
        return Err(CliError::Command(format!(
            "faulty server: expected \"pong\", got {reply:?}"
        )));
    }

    Ok(PingReport {
        url: client.url().to_owned(),
        reply,
        elapsed_ms,
    })
}

#[derive(Debug, Serialize)]
pub struct PingReport {
    pub url: String,
    pub reply: String,
    pub elapsed_ms: u64,
}

impl Render for PingReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "{} from {} ({} ms)", self.reply, self.url, self.elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_ping_report() {
        let report = PingReport {
            url: "http://localhost:7080/rpc".to_owned(),
            reply: "pong".to_owned(),
            elapsed_ms: 3,
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "pong from http://localhost:7080/rpc (3 ms)\n"
        );
    }
}
