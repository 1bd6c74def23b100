//! Line-based reader for the INI dialect used by unixODBC's `odbc.ini` and
//! `odbcinst.ini`.
use once_cell::sync::Lazy;
use regex::Regex;

static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[([^\]]*)\]\s*$").expect("section pattern is valid"));
static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^=;#\s][^=]*?)\s*=\s*(.*?)\s*$").expect("entry pattern is valid"));

/// One `[name]` section and its `key = value` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Stanza {
    pub name: String,
    pub entries: Vec<(String, String)>,
    /// Byte offset of the header line in the source text
    pub offset: usize,
}

impl Stanza {
    /// Value of `key`, matched case-insensitively like the driver manager does.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parses every stanza in `text`. Comment lines (`;` or `#`) and lines
/// before the first header are ignored.
pub fn parse(text: &str) -> Vec<Stanza> {
    let mut stanzas: Vec<Stanza> = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if let Some(caps) = SECTION_RE.captures(trimmed) {
            stanzas.push(Stanza {
                name: caps[1].trim().to_string(),
                entries: Vec::new(),
                offset,
            });
        } else if let Some(caps) = ENTRY_RE.captures(trimmed) {
            if let Some(current) = stanzas.last_mut() {
                current.entries.push((caps[1].to_string(), caps[2].to_string()));
            }
        }
        offset += line.len();
    }

    stanzas
}

/// Renders a stanza followed by a blank line.
pub fn render_stanza(name: &str, entries: &[(&str, &str)]) -> String {
    let mut out = format!("[{}]\n", name);
    for (key, value) in entries {
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out
}
