use std::fmt;

use anyhow::{Result, bail};

pub const DEFAULT_LINK_TEMPLATE: &str = "https://www.third_party_service.com/ab/proposals/{uid}";

const UID_PLACEHOLDER: &str = "{uid}";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub uid: String,
    pub created_at: String,
    pub scanner_name: String,
    pub proposal_link: String,
}

/// URL template turning a proposal uid into its link. Every `{uid}` is substituted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTemplate(String);

impl LinkTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(UID_PLACEHOLDER) {
            bail!("link template {template:?} does not contain {UID_PLACEHOLDER}");
        }
        Ok(Self(template))
    }

    pub fn link(&self, uid: &str) -> String {
        self.0.replace(UID_PLACEHOLDER, uid)
    }
}

impl Default for LinkTemplate {
    fn default() -> Self {
        Self(DEFAULT_LINK_TEMPLATE.to_owned())
    }
}

impl fmt::Display for LinkTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row as written to the sheet: timestamp, scanner, a blank annotation column, link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationRow {
    pub created_at: String,
    pub scanner_name: String,
    pub proposal_link: String,
}

impl ReconciliationRow {
    pub fn values(&self) -> [&str; 4] {
        [
            self.created_at.as_str(),
            self.scanner_name.as_str(),
            "",
            self.proposal_link.as_str(),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_link_default_template() {
        assert_eq!(
            LinkTemplate::default().link("12345"),
            "https://www.third_party_service.com/ab/proposals/12345"
        );
    }

    #[test]
    fn test_link_is_deterministic() {
        let template = LinkTemplate::default();
        for uid in ["", "1", "abc-def", "ünïcode"] {
            assert_eq!(template.link(uid), template.link(uid));
        }
    }

    #[test]
    fn test_link_custom_template() -> Result<()> {
        let template = LinkTemplate::new("https://3rd_party_service_link/{uid}")?;
        assert_eq!(template.link("42"), "https://3rd_party_service_link/42");
        Ok(())
    }

    #[test]
    fn test_link_template_repeated_placeholder() -> Result<()> {
        let template = LinkTemplate::new("https://x.test/{uid}?ref={uid}")?;
        assert_eq!(template.link("7"), "https://x.test/7?ref=7");
        Ok(())
    }

    #[test]
    fn test_link_template_without_placeholder_rejected() {
        assert!(LinkTemplate::new("https://x.test/static").is_err());
    }

    #[test]
    fn test_row_values_blank_third_column() {
        let row = ReconciliationRow {
            created_at: "05 Mar, 2024 14:00:00".to_owned(),
            scanner_name: "Scanner".to_owned(),
            proposal_link: "https://x.test/1".to_owned(),
        };
        assert_eq!(
            row.values(),
            ["05 Mar, 2024 14:00:00", "Scanner", "", "https://x.test/1"]
        );
    }
}
