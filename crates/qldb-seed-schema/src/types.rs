//! Identifier types shared by the ledger and provisioning layers.
//!
//! Both serialize as plain strings, so an id can be written straight into a
//! document field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! ledger_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

ledger_identifier!(
    /// Identifier the ledger assigns to a document when it is inserted.
    DocumentId
);

ledger_identifier!(
    /// Name of a QLDB ledger, as passed in the custom resource properties.
    LedgerName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_displays_its_text() {
        let id = DocumentId::new("3Qv67yjXEwB9SjmvkuG6Cp");
        assert_eq!(id.to_string(), "3Qv67yjXEwB9SjmvkuG6Cp");
        assert_eq!(id.as_str(), "3Qv67yjXEwB9SjmvkuG6Cp");
    }

    #[test]
    fn document_id_serializes_as_plain_string() {
        let id = DocumentId::new("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: DocumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ledger_name_derefs_to_str() {
        let name = LedgerName::from("vehicle-registration");
        assert_eq!(name, LedgerName::new(String::from("vehicle-registration")));
        assert!(name.starts_with("vehicle"));
    }
}
