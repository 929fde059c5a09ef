use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

/// Destructive text patterns a `write` action must never type. This is a
/// best-effort blocklist, not a sandbox: it stops the obvious footguns, not a
/// determined adversary.
const DENYLIST: [&str; 5] = [
    // recursive delete
    r"rm\s+-rf",
    // format filesystem
    r"mkfs",
    // overwrite block device
    r">\s*/dev/sd",
    // direct disk write
    r"dd\s+if=",
    // fork bomb
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\};\s*:",
];

fn compiled() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DENYLIST
            .iter()
            .map(|raw| {
                let re = RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .expect("denylist pattern must compile");
                (re, *raw)
            })
            .collect()
    })
}

/// Returns the denylist pattern the content matches, if any. `None` means the
/// write is permitted. Only `write` content is ever screened; other action
/// kinds never reach this filter.
pub fn blocked_write_pattern(content: &str) -> Option<&'static str> {
    compiled()
        .iter()
        .find(|(re, _)| re.is_match(content))
        .map(|(_, raw)| *raw)
}
