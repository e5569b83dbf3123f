// src/bag/metadata.rs

//! Reserved `bag-info.txt` metadata names and property file parsing

use crate::encoding::split_lines;
use std::fmt;
use std::str::FromStr;

/// Metadata names with meaning defined by BagIt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataName {
    SourceOrganization,
    OrganizationAddress,
    ContactName,
    ContactPhone,
    ContactEmail,
    ExternalDescription,
    BaggingDate,
    ExternalIdentifier,
    BagSize,
    PayloadOxum,
    BagGroupIdentifier,
    BagCount,
    InternalSenderIdentifier,
    InternalSenderDescription,
    BagSoftwareAgent,
}

impl MetadataName {
    pub const ALL: [MetadataName; 15] = [
        Self::SourceOrganization,
        Self::OrganizationAddress,
        Self::ContactName,
        Self::ContactPhone,
        Self::ContactEmail,
        Self::ExternalDescription,
        Self::BaggingDate,
        Self::ExternalIdentifier,
        Self::BagSize,
        Self::PayloadOxum,
        Self::BagGroupIdentifier,
        Self::BagCount,
        Self::InternalSenderIdentifier,
        Self::InternalSenderDescription,
        Self::BagSoftwareAgent,
    ];

    /// Names the builder fills in by default at build time
    pub const AUTO_GENERATED: [MetadataName; 4] = [
        Self::BaggingDate,
        Self::BagSize,
        Self::PayloadOxum,
        Self::BagSoftwareAgent,
    ];

    /// Property name as written in `bag-info.txt`
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceOrganization => "Source-Organization",
            Self::OrganizationAddress => "Organization-Address",
            Self::ContactName => "Contact-Name",
            Self::ContactPhone => "Contact-Phone",
            Self::ContactEmail => "Contact-Email",
            Self::ExternalDescription => "External-Description",
            Self::BaggingDate => "Bagging-Date",
            Self::ExternalIdentifier => "External-Identifier",
            Self::BagSize => "Bag-Size",
            Self::PayloadOxum => "Payload-Oxum",
            Self::BagGroupIdentifier => "Bag-Group-Identifier",
            Self::BagCount => "Bag-Count",
            Self::InternalSenderIdentifier => "Internal-Sender-Identifier",
            Self::InternalSenderDescription => "Internal-Sender-Description",
            Self::BagSoftwareAgent => "Bag-Software-Agent",
        }
    }

    pub fn is_auto_generatable(&self) -> bool {
        Self::AUTO_GENERATED.contains(self)
    }
}

impl fmt::Display for MetadataName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetadataName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("not a reserved metadata name: {}", s))
    }
}

/// Parse decoded property file text into `(name, value)` pairs, in file order
///
/// A line starting with whitespace continues the previous value: its single
/// leading space is dropped and the remainder appended. Lines without a
/// `name: value` separator are skipped.
pub(crate) fn parse_properties(text: &str) -> Vec<(String, String)> {
    let mut logical: Vec<String> = Vec::new();
    for line in split_lines(text) {
        if let Some(rest) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = logical.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        logical.push(line.to_string());
    }

    logical
        .into_iter()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.strip_prefix(' ').unwrap_or(value).to_string()))
        })
        .collect()
}

/// Format a byte count with binary units, as written to `Bag-Size`
pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::writer::fold_property;

    #[test]
    fn test_names_round_trip() {
        for name in MetadataName::ALL {
            assert_eq!(name.name().parse::<MetadataName>().unwrap(), name);
        }
        assert_eq!("payload-oxum".parse::<MetadataName>().unwrap(), MetadataName::PayloadOxum);
        assert!("Favourite-Colour".parse::<MetadataName>().is_err());
    }

    #[test]
    fn test_auto_generatable() {
        assert!(MetadataName::BaggingDate.is_auto_generatable());
        assert!(MetadataName::BagSoftwareAgent.is_auto_generatable());
        assert!(!MetadataName::ContactName.is_auto_generatable());
    }

    #[test]
    fn test_parse_properties_keeps_order_and_duplicates() {
        let text = "Contact-Name: Ann\nContact-Name: Bob\r\nBag-Count: 1 of 2\n";
        let props = parse_properties(text);
        assert_eq!(
            props,
            vec![
                ("Contact-Name".to_string(), "Ann".to_string()),
                ("Contact-Name".to_string(), "Bob".to_string()),
                ("Bag-Count".to_string(), "1 of 2".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_unfolds_written_lines() {
        let value = "abcdefghij".repeat(25);
        let text: String = fold_property("External-Description", &value)
            .into_iter()
            .map(|l| l + "\n")
            .collect();
        let props = parse_properties(&text);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].1, value);
    }

    #[test]
    fn test_value_with_colon() {
        let props = parse_properties("Source-Organization: http://example.org\n");
        assert_eq!(props[0].1, "http://example.org");
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1024), "1.00 KB");
        assert_eq!(human_bytes(13_000), "12.70 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
