//! `authwatch country` command handler

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::net::IpAddr;

use serde::Serialize;

use authwatch_core::event::{HostInfo, HostInfoMap, HostMessages};
use authwatch_rpc::RpcClient;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Placeholder for a missing or blank location field.
const UNKNOWN: &str = "??";

/// Execute the `country` command.
pub async fn execute(client: &RpcClient, writer: &OutputWriter) -> Result<(), CliError> {
    let messages = client.host_messages().await?;
    let info = client.host_info().await?;
    writer.render(&build_report(&messages, &info))
}

/// Group every known host by (country, region, city, org).
pub fn build_report(messages: &HostMessages, info: &HostInfoMap) -> CountryReport {
    let mut groups: BTreeMap<(String, String, String, String), BTreeSet<IpAddr>> = BTreeMap::new();

    for address in messages.keys() {
        let host = info.get(address);
        let key = (
            field(host, |h| h.country.as_deref()),
            field(host, |h| h.region.as_deref()),
            field(host, |h| h.city.as_deref()),
            field(host, |h| h.org.as_deref()),
        );
        groups.entry(key).or_default().insert(*address);
    }

    let groups = groups
        .into_iter()
        .map(|((country, region, city, org), hosts)| CountryGroup {
            country,
            region,
            city,
            org,
            hosts: hosts.into_iter().collect(),
        })
        .collect();

    CountryReport { groups }
}

fn field(host: Option<&HostInfo>, get: impl Fn(&HostInfo) -> Option<&str>) -> String {
    host.and_then(get)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_owned()
}

#[derive(Debug, Serialize)]
pub struct CountryReport {
    pub groups: Vec<CountryGroup>,
}

#[derive(Debug, Serialize)]
pub struct CountryGroup {
    pub country: String,
    pub region: String,
    pub city: String,
    pub org: String,
    pub hosts: Vec<IpAddr>,
}

impl Render for CountryReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for group in &self.groups {
            let hosts = group
                .hosts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                w,
                "{:<2}: {:>15}, {:<20} {:<50} {}",
                group.country, group.city, group.region, group.org, hosts
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(country: &str, region: &str, city: &str, org: &str) -> HostInfo {
        HostInfo {
            country: Some(country.to_owned()),
            region: Some(region.to_owned()),
            city: Some(city.to_owned()),
            org: Some(org.to_owned()),
            ..HostInfo::default()
        }
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn messages(hosts: &[&str]) -> HostMessages {
        hosts
            .iter()
            .map(|h| (addr(h), BTreeMap::from([("m".to_owned(), 1)])))
            .collect()
    }

    #[test]
    fn test_hosts_with_same_location_are_grouped() {
        let msgs = messages(&["8.8.8.8", "8.8.4.4", "1.1.1.1"]);
        let google = info("US", "California", "Mountain View", "AS15169 Google LLC");
        let map = HostInfoMap::from([
            (addr("8.8.8.8"), google.clone()),
            (addr("8.8.4.4"), google),
            (
                addr("1.1.1.1"),
                info("AU", "Queensland", "Brisbane", "AS13335 Cloudflare"),
            ),
        ]);

        let report = build_report(&msgs, &map);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].country, "AU");
        assert_eq!(report.groups[1].country, "US");
        assert_eq!(
            report.groups[1].hosts,
            vec![addr("8.8.4.4"), addr("8.8.8.8")]
        );
    }

    #[test]
    fn test_missing_and_blank_fields_are_unknown() {
        let msgs = messages(&["5.6.7.8", "9.9.9.9"]);
        let map = HostInfoMap::from([(addr("9.9.9.9"), info("CH", "  ", "Zurich", "AS19281"))]);

        let report = build_report(&msgs, &map);
        let unknown = report
            .groups
            .iter()
            .find(|g| g.hosts == vec![addr("5.6.7.8")])
            .expect("host without info is still listed");
        assert_eq!(
            (unknown.country.as_str(), unknown.region.as_str(), unknown.city.as_str()),
            (UNKNOWN, UNKNOWN, UNKNOWN)
        );

        let swiss = report
            .groups
            .iter()
            .find(|g| g.country == "CH")
            .expect("swiss group");
        assert_eq!(swiss.region, UNKNOWN);
    }

    #[test]
    fn test_render_text_columns() {
        let msgs = messages(&["8.8.8.8"]);
        let map = HostInfoMap::from([(
            addr("8.8.8.8"),
            info("US", "California", "Mountain View", "AS15169 Google LLC"),
        )]);

        let mut buffer = Vec::new();
        build_report(&msgs, &map)
            .render_text(&mut buffer)
            .expect("render");
        let expected = format!(
            "US:   Mountain View, California           {:<50} 8.8.8.8\n",
            "AS15169 Google LLC"
        );
        assert_eq!(String::from_utf8(buffer).expect("utf8"), expected);
    }
}
