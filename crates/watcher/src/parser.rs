//! auth.log 라인 파서 및 사설 대역 필터
//!
//! [`AuthLineParser`]는 `sshd[pid]: message` 형식의 라인에서 메시지, 원격 주소,
//! 포트를 추출하고, 호스트별 빈도 집계에 쓰이는 정제된 메시지를 만듭니다.
//!
//! 정제 규칙:
//! - 인용 문자열(`'...'`, `"..."`)을 제거하여 사용자명별 변형을 하나로 묶습니다.
//! - 주소 문자열을 모두 제거합니다.
//! - 마지막 ` port N`의 숫자 부분만 제거합니다 (다른 위치의 같은 숫자는 유지).
//!
//! [`AddressFilter`]는 CIDR(`a.b.c.d/n`) 또는 텍스트 접두사(`192.168.`)로
//! 원격으로 취급하지 않을 주소를 정의합니다.

use std::net::Ipv4Addr;

use regex::Regex;

use crate::error::WatcherError;

/// sshd 라인 패턴
const SSHD_PATTERN: &str = r"sshd\[\d+\]: (?P<message>.*)";
/// 점 표기 IPv4 주소 패턴
const ADDRESS_PATTERN: &str = r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b";
/// 포트 패턴 (마지막 출현을 사용)
const PORT_PATTERN: &str = r" port (?P<port>\d+)\b";
/// 인용 문자열 패턴
const QUOTED_PATTERN: &str = r#"['"].+['"]"#;

/// 파싱된 sshd 라인
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// sshd 원본 메시지
    pub message: String,
    /// 정제된 메시지
    pub sanitized: String,
    /// 원격 주소 (없거나 유효하지 않으면 `None`)
    pub address: Option<Ipv4Addr>,
    /// 원격 포트
    pub port: Option<u16>,
}

/// sshd 인증 로그 라인 파서
///
/// 정규식은 생성 시 한 번만 컴파일합니다.
#[derive(Debug, Clone)]
pub struct AuthLineParser {
    sshd: Regex,
    address: Regex,
    port: Regex,
    quoted: Regex,
}

impl AuthLineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Result<Self, WatcherError> {
        Ok(Self {
            sshd: Regex::new(SSHD_PATTERN)?,
            address: Regex::new(ADDRESS_PATTERN)?,
            port: Regex::new(PORT_PATTERN)?,
            quoted: Regex::new(QUOTED_PATTERN)?,
        })
    }

    /// 라인을 파싱합니다. sshd 라인이 아니면 `None`을 반환합니다.
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = self.sshd.captures(line)?;
        let message = caps.name("message")?.as_str();

        let mut sanitized = self.quoted.replace_all(message, "").into_owned();

        let address_text = self.address.find(message).map(|m| m.as_str());
        let address = address_text.and_then(|text| text.parse::<Ipv4Addr>().ok());
        if let Some(text) = address_text {
            sanitized = sanitized.replace(text, "");
        }

        let port_text = self
            .port
            .captures_iter(message)
            .last()
            .and_then(|c| c.name("port"))
            .map(|m| m.as_str());
        let port = port_text.and_then(|text| text.parse::<u16>().ok());
        if let Some(text) = port_text {
            sanitized = self.strip_last_port(&sanitized, text);
        }

        Some(ParsedLine {
            message: message.to_owned(),
            sanitized,
            address,
            port,
        })
    }

    /// 정제 중인 문자열에서 마지막 ` port N`의 숫자 부분을 제거합니다.
    ///
    /// 같은 숫자가 메시지의 다른 위치(`Bye 22` 등)에 나와도 그대로 둡니다.
    /// 포트 문자열 전체를 치환하는 방식과 달리 메시지 본문의 숫자를 지우지 않습니다.
    fn strip_last_port(&self, sanitized: &str, port: &str) -> String {
        let span = self
            .port
            .captures_iter(sanitized)
            .filter_map(|c| c.name("port"))
            .filter(|m| m.as_str() == port)
            .last()
            .map(|m| m.range());
        match span {
            Some(range) => {
                let mut out = String::with_capacity(sanitized.len());
                out.push_str(&sanitized[..range.start]);
                out.push_str(&sanitized[range.end..]);
                out
            }
            None => sanitized.to_owned(),
        }
    }
}

/// 필터 규칙 하나
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterRule {
    /// 네트워크 주소와 마스크
    Cidr { network: u32, mask: u32 },
    /// 주소 문자열 접두사
    Prefix(String),
}

impl FilterRule {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        match self {
            Self::Cidr { network, mask } => u32::from(addr) & mask == *network,
            Self::Prefix(prefix) => addr.to_string().starts_with(prefix.as_str()),
        }
    }
}

/// 원격으로 취급하지 않을 주소 대역
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    rules: Vec<FilterRule>,
}

impl AddressFilter {
    /// 패턴 목록으로 필터를 생성합니다.
    ///
    /// `/`를 포함하면 CIDR로, 아니면 텍스트 접두사로 해석합니다.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, WatcherError> {
        let rules = patterns
            .iter()
            .map(|p| parse_rule(p.as_ref().trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// 주소가 사설 대역에 속하는지 확인합니다.
    pub fn is_private(&self, addr: Ipv4Addr) -> bool {
        self.rules.iter().any(|rule| rule.matches(addr))
    }

    /// 규칙 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn parse_rule(pattern: &str) -> Result<FilterRule, WatcherError> {
    let invalid = |reason: &str| WatcherError::Config {
        field: "private_filters".to_owned(),
        reason: format!("'{pattern}': {reason}"),
    };

    match pattern.split_once('/') {
        Some((network, len)) => {
            let network: Ipv4Addr = network
                .parse()
                .map_err(|_| invalid("invalid network address"))?;
            let len: u32 = len
                .parse()
                .ok()
                .filter(|l| *l <= 32)
                .ok_or_else(|| invalid("prefix length must be 0-32"))?;
            let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
            Ok(FilterRule::Cidr {
                network: u32::from(network) & mask,
                mask,
            })
        }
        None if pattern.is_empty() => Err(invalid("empty pattern")),
        None => Ok(FilterRule::Prefix(pattern.to_owned())),
    }
}
