//! Translating `#IIP` and `#IOP` parameter text
//!
//! The text is a list of groups separated by commas (or line breaks). A group
//! is one of:
//!
//! * a device identifier with settings, `TRAI_HD1:N=0;X=0.000;Y=0.000`,
//! * a labelled value, `EMXV:EM2040P` or `Max angle Port: 70.0`,
//! * `KEY=value` pairs separated by semicolons, `SN=53011`,
//! * a bare device marker such as `PU_0`, which opens a section for the
//!   pairs that follow it.
//!
//! Anything else is kept in [`Parameters::unparsed`].
use std::collections::BTreeMap;
use tracing::debug;

/// Section holding settings that precede any device marker
pub const TOP_LEVEL: &str = "";

/// Translated parameter text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    /// Settings keyed by section, then by key
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
    /// Groups that fit none of the known shapes, in text order
    pub unparsed: Vec<String>,
}

impl Parameters {
    /// Look up `key` in `section`
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    fn insert(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.trim().to_string(), value.trim().to_string());
    }
}

/// Device identifier prefixes and what they name
static SECTION_DESCRIPTIONS: &[(&str, &str)] = &[
    ("ATTI_", "Attitude sensor"),
    ("CLCK", "Clock"),
    ("CPU", "Processing unit CPU"),
    ("DCL", "Dual head configuration"),
    ("DPHI", "Depth (pressure) sensor"),
    ("EMXI", "Echo sounder installation"),
    ("EMXV", "Echo sounder model"),
    ("OSCV", "Operator station"),
    ("POSI_", "Position system"),
    ("PU_", "Processing unit"),
    ("SVPI", "Sound velocity profile input"),
    ("SVTI", "Sound velocity at transducer input"),
    ("TRAI_HD", "Transducer head"),
    ("TRAI_RX", "Receive transducer"),
    ("TRAI_TX", "Transmit transducer"),
    ("VERSIONS", "Software versions"),
    ("WLI", "Water line"),
];

/// Setting keys and their meaning
static KEY_DESCRIPTIONS: &[(&str, &str)] = &[
    ("H", "Heading offset, degrees"),
    ("IP", "IP address and subnet mask"),
    ("IX", "Transducer index"),
    ("N", "Serial number"),
    ("P", "Pitch offset, degrees"),
    ("R", "Roll offset, degrees"),
    ("S", "Array size"),
    ("SN", "Serial number"),
    ("TYPE", "Unit type"),
    ("U", "Sensor usage"),
    ("UDP", "UDP port"),
    ("V", "Version"),
    ("X", "Forward offset, metres"),
    ("Y", "Starboard offset, metres"),
    ("Z", "Downward offset, metres"),
];

/// Describe a section name by its longest matching device prefix
pub fn describe_section(name: &str) -> Option<&'static str> {
    SECTION_DESCRIPTIONS
        .iter()
        .filter(|(prefix, _)| name.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, d)| *d)
}

/// Describe a setting key
pub fn describe_key(key: &str) -> Option<&'static str> {
    KEY_DESCRIPTIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, d)| *d)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Split `KEY=value;KEY=value` into `section`, reporting pieces without `=`
fn insert_pairs(params: &mut Parameters, section: &str, group: &str) {
    for sub in group.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        match sub.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => params.insert(section, key, value),
            _ => {
                debug!(token = sub, "unparsed parameter token");
                params.unparsed.push(sub.to_string());
            }
        }
    }
}

/// Translate parameter text into sections of key/value settings
pub fn translate(text: &str) -> Parameters {
    let mut params = Parameters::default();
    let mut section = TOP_LEVEL.to_string();

    for group in text
        .split([',', '\n', '\r'])
        .map(str::trim)
        .filter(|g| !g.is_empty())
    {
        // the text repeats its own datagram tag
        if group.starts_with('#') && is_identifier(&group[1..]) {
            continue;
        }
        if let Some((name, rest)) = group.split_once(':') {
            let name = name.trim();
            if is_identifier(name) && rest.contains('=') {
                section = name.to_string();
                insert_pairs(&mut params, &section, rest);
                continue;
            }
            if !name.is_empty() && !name.contains('=') {
                params.insert(&section, name, rest);
                continue;
            }
        }
        if group.contains('=') {
            insert_pairs(&mut params, &section, group);
        } else if is_identifier(group) {
            section = group.to_string();
            params.sections.entry(section.clone()).or_default();
        } else {
            debug!(token = group, "unparsed parameter group");
            params.unparsed.push(group.to_string());
        }
    }
    params
}
