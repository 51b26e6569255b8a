//! `authwatch summary` command handler

use std::io::Write;
use std::net::IpAddr;

use serde::Serialize;

use authwatch_core::event::{HostInfo, HostInfoMap, HostMessages};
use authwatch_rpc::RpcClient;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `summary` command.
pub async fn execute(client: &RpcClient, writer: &OutputWriter) -> Result<(), CliError> {
    let messages = client.host_messages().await?;
    let info = client.host_info().await?;
    writer.render(&build_report(&messages, &info))
}

/// Build the per-host report: hosts in address order, messages by count descending.
pub fn build_report(messages: &HostMessages, info: &HostInfoMap) -> SummaryReport {
    let hosts = messages
        .iter()
        .map(|(address, counts)| {
            let mut messages: Vec<MessageCount> = counts
                .iter()
                .map(|(message, count)| MessageCount {
                    message: message.clone(),
                    count: *count,
                })
                .collect();
            // stable: equal counts keep message order
            messages.sort_by(|a, b| b.count.cmp(&a.count));

            HostSummary {
                address: *address,
                info: info.get(address).cloned(),
                messages,
            }
        })
        .collect();

    SummaryReport { hosts }
}

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub hosts: Vec<HostSummary>,
}

#[derive(Debug, Serialize)]
pub struct HostSummary {
    pub address: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<HostInfo>,
    pub messages: Vec<MessageCount>,
}

#[derive(Debug, Serialize)]
pub struct MessageCount {
    pub message: String,
    pub count: u64,
}

impl Render for SummaryReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for host in &self.hosts {
            let info = host
                .info
                .as_ref()
                .map_or_else(|| "No info.".to_owned(), ToString::to_string);
            writeln!(w, "{}: {}", host.address.to_string().bold(), info)?;
            writeln!(w, "    {:<5} {}", "Count", "Message")?;
            writeln!(w, "    {:<5} {}", "-----", "-".repeat(50))?;
            for entry in &host.messages {
                writeln!(w, "    {:>5}: {:?}", entry.count, entry.message)?;
            }
            writeln!(w)?;
        }

        writeln!(w)?;
        writeln!(w, "{} Hosts", self.hosts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn host_info() -> HostInfo {
        HostInfo {
            city: Some("Mountain View".to_owned()),
            region: Some("California".to_owned()),
            country: Some("US".to_owned()),
            org: Some("AS15169 Google LLC".to_owned()),
            ..HostInfo::default()
        }
    }

    fn sample() -> (HostMessages, HostInfoMap) {
        let google: IpAddr = "8.8.8.8".parse().unwrap();
        let other: IpAddr = "1.2.3.4".parse().unwrap();

        let mut messages = HostMessages::new();
        messages.insert(
            google,
            BTreeMap::from([
                ("Connection closed by  port  [preauth]".to_owned(), 1),
                ("Failed password for root from  port  ssh2".to_owned(), 3),
            ]),
        );
        messages.insert(
            other,
            BTreeMap::from([("Invalid user  from ".to_owned(), 2)]),
        );

        let info = HostInfoMap::from([(google, host_info())]);
        (messages, info)
    }

    #[test]
    fn test_hosts_sorted_and_messages_by_count() {
        let (messages, info) = sample();
        let report = build_report(&messages, &info);

        assert_eq!(report.hosts.len(), 2);
        assert_eq!(report.hosts[0].address.to_string(), "1.2.3.4");
        assert!(report.hosts[0].info.is_none());

        let google = &report.hosts[1];
        assert_eq!(google.messages[0].count, 3);
        assert_eq!(google.messages[1].count, 1);
    }

    #[test]
    fn test_render_text_layout() {
        colored::control::set_override(false);
        let (messages, info) = sample();
        let mut buffer = Vec::new();
        build_report(&messages, &info)
            .render_text(&mut buffer)
            .expect("render");
        let output = String::from_utf8(buffer).expect("utf8");

        let expected_google = concat!(
            "8.8.8.8: Mountain View, California (US): AS15169 Google LLC\n",
            "    Count Message\n",
            "    ----- --------------------------------------------------\n",
            "        3: \"Failed password for root from  port  ssh2\"\n",
            "        1: \"Connection closed by  port  [preauth]\"\n",
        );
        assert!(output.starts_with("1.2.3.4: No info.\n"), "got:\n{output}");
        assert!(output.contains(expected_google), "got:\n{output}");
        assert!(output.ends_with("\n\n2 Hosts\n"), "got:\n{output}");
    }

    #[test]
    fn test_render_empty() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        build_report(&HostMessages::new(), &HostInfoMap::new())
            .render_text(&mut buffer)
            .expect("render");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "\n0 Hosts\n");
    }
}
