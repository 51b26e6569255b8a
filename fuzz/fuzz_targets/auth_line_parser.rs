#![no_main]

use authwatch_watcher::{AddressFilter, AuthLineParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parser) = AuthLineParser::new() else {
        return;
    };

    // 크래시나 패닉 없이 Some 또는 None을 반환해야 한다
    if let Some(parsed) = parser.parse(line) {
        assert!(line.contains(parsed.message.as_str()));
        assert!(parsed.sanitized.len() <= parsed.message.len());
        if let Some(addr) = parsed.address {
            let _ = AddressFilter::default().is_private(addr);
        }
    }

    // 임의 패턴도 패닉 없이 Ok 또는 Err
    let _ = AddressFilter::from_patterns(&[line]);
});
