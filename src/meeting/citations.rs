//! Citation Validator

use crate::meeting::blackboard::Blackboard;
use serde::{Deserialize, Serialize};

/// IDs cited by a record that do not exist on the blackboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationCheck {
    /// Unknown fact IDs, in citation order
    pub invalid_facts: Vec<String>,
    /// Unknown uncertainty IDs, in citation order
    pub invalid_uncertainties: Vec<String>,
}

impl CitationCheck {
    /// Every citation resolved
    pub fn is_ok(&self) -> bool {
        self.invalid_facts.is_empty() && self.invalid_uncertainties.is_empty()
    }

    /// All unresolved IDs, facts first
    pub fn invalid_ids(&self) -> Vec<&str> {
        self.invalid_facts
            .iter()
            .chain(&self.invalid_uncertainties)
            .map(String::as_str)
            .collect()
    }

    /// Text stored in a record's `citation_error`, `None` when valid
    pub fn error_message(&self) -> Option<String> {
        if self.is_ok() {
            return None;
        }
        Some(format!(
            "Invalid citations: facts=[{}] uncertainties=[{}]",
            self.invalid_facts.join(", "),
            self.invalid_uncertainties.join(", ")
        ))
    }
}

/// Check cited IDs against the blackboard
pub fn validate(
    cited_facts: &[String],
    cited_uncertainties: &[String],
    blackboard: &Blackboard,
) -> CitationCheck {
    CitationCheck {
        invalid_facts: cited_facts
            .iter()
            .filter(|id| !blackboard.has_fact(id))
            .cloned()
            .collect(),
        invalid_uncertainties: cited_uncertainties
            .iter()
            .filter(|id| !blackboard.has_uncertainty(id))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blackboard() -> Blackboard {
        let obj = json!({
            "facts": [
                {"text": "a", "source": "macro"},
                {"text": "b", "source": "nfp"}
            ],
            "uncertainties": [{"text": "c"}]
        });
        Blackboard::from_extraction("m1", obj.as_object().unwrap(), 28, 8)
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_citations() {
        let check = validate(&ids(&["F01", "F02"]), &ids(&["U01"]), &blackboard());
        assert!(check.is_ok());
        assert_eq!(check.error_message(), None);
    }

    #[test]
    fn test_no_citations_is_valid() {
        assert!(validate(&[], &[], &blackboard()).is_ok());
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let check = validate(&ids(&["F01", "F09", "U01"]), &ids(&["U02"]), &blackboard());
        assert!(!check.is_ok());
        assert_eq!(check.invalid_ids(), vec!["F09", "U01", "U02"]);
        assert_eq!(
            check.error_message().unwrap(),
            "Invalid citations: facts=[F09, U01] uncertainties=[U02]"
        );
    }
}
