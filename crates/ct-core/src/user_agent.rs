//! Editor plugin user-agent parsing.

use std::sync::LazyLock;

use regex::Regex;

/// `wakatime/<v> (<os>-<kernel>-<arch>) <runtime> <editor>/<v> <plugin>-wakatime/<v>`
/// and the shorter forms sent by browser extensions and desktop plugins.
static PLUGIN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?iU)^(?:(?:wakatime|chrome|firefox|edge)/(?:v?[\d+.]+|unset)?\s)?(?:\(?(\w+)[-_].*\)?.+\s)?(?:([^/\s]+)/\w+\s)?([^/\s]+)-wakatime/.+$",
    )
    .ok()
});

/// Editor and operating system derived from a user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub operating_system: String,
    pub editor: String,
}

/// Parses a plugin user agent, falling back to plain browser agents.
pub fn parse_user_agent(user_agent: &str) -> Option<ParsedUserAgent> {
    if let Some(caps) = PLUGIN_RE.as_ref().and_then(|re| re.captures(user_agent)) {
        let os = match caps.get(1).map_or("", |m| m.as_str()) {
            "win" => "windows",
            "darwin" => "macos",
            other => other,
        };
        let mut editor = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str())
            .to_string();
        if editor == "vim" && user_agent.contains("neovim/") {
            editor = "neovim".to_string();
        }
        return Some(ParsedUserAgent {
            operating_system: capitalize_lower(os),
            editor,
        });
    }
    parse_browser_agent(user_agent)
}

fn parse_browser_agent(user_agent: &str) -> Option<ParsedUserAgent> {
    const BROWSERS: &[(&str, &str)] = &[
        ("Edg/", "Edge"),
        ("Firefox/", "Firefox"),
        ("Chrome/", "Chrome"),
        ("Safari/", "Safari"),
    ];
    const SYSTEMS: &[(&str, &str)] = &[
        ("Android", "Android"),
        ("iPhone", "iOS"),
        ("iPad", "iOS"),
        ("Windows", "Windows"),
        ("Mac OS X", "Macos"),
        ("Macintosh", "Macos"),
        ("CrOS", "Chromeos"),
        ("Linux", "Linux"),
    ];
    let editor = BROWSERS
        .iter()
        .find(|(token, _)| user_agent.contains(token))
        .map(|(_, name)| *name)?;
    let os = SYSTEMS
        .iter()
        .find(|(token, _)| user_agent.contains(token))
        .map(|(_, name)| *name)?;
    Some(ParsedUserAgent {
        operating_system: os.to_string(),
        editor: editor.to_string(),
    })
}

fn capitalize_lower(value: &str) -> String {
    let mut chars = value.chars();
    chars.next().map_or_else(String::new, |first| {
        first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect()
    })
}
