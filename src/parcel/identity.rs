//! Composite parcel codes.

use super::ParcelIdentity;
use crate::error::FabricError;

/// How composite codes are synthesised from identity fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentityScheme {
    /// Fourteen-character French cadastral code: department (2), commune (3),
    /// absorbed-commune prefix (3), section (2), number (4).
    #[default]
    FrenchCadastral,
    /// `commune-section-number`, no padding.
    Generic,
}

impl IdentityScheme {
    /// Build the composite code for `identity`.
    ///
    /// `label` names the record in the error when a required field is missing.
    pub fn code(&self, identity: &ParcelIdentity, label: &str) -> Result<String, FabricError> {
        let require = |field: &'static str, value: &Option<String>| {
            value.clone().ok_or_else(|| FabricError::AttributeMissing {
                field,
                parcel: label.to_string(),
            })
        };

        let commune = require("commune", &identity.commune)?;
        let section = require("section", &identity.section)?;
        let number = require("number", &identity.number)?;

        match self {
            Self::FrenchCadastral => {
                let department = require("department", &identity.department)?;
                let sub_code = identity.commune_sub_code.clone().unwrap_or_else(|| "000".to_string());
                Ok(format!(
                    "{}{}{}{}{}",
                    pad_left(&department, 2),
                    pad_left(&commune, 3),
                    pad_left(&sub_code, 3),
                    pad_left(&section, 2),
                    pad_left(&number, 4),
                ))
            }
            Self::Generic => Ok(format!("{commune}-{section}-{number}")),
        }
    }

    /// Fill `section`, `number` and `code` on a fresh identity.
    pub fn assign(
        &self,
        identity: &mut ParcelIdentity,
        section: &str,
        number: usize,
        label: &str,
    ) -> Result<(), FabricError> {
        identity.section = Some(section.to_string());
        identity.number = Some(number.to_string());
        identity.code = Some(self.code(identity, label)?);
        Ok(())
    }
}

/// Left-pad with zeros; longer values are kept whole.
fn pad_left(value: &str, width: usize) -> String {
    format!("{value:0>width$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ParcelIdentity {
        ParcelIdentity {
            department: Some("25".to_string()),
            commune: Some("56".to_string()),
            section: Some("B".to_string()),
            number: Some("12".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn french_code_is_padded() {
        let code = IdentityScheme::FrenchCadastral.code(&identity(), "test").unwrap();
        assert_eq!(code, "250560000B0012");
        assert_eq!(code.len(), 14);
    }

    #[test]
    fn generic_code_is_plain() {
        let code = IdentityScheme::Generic.code(&identity(), "test").unwrap();
        assert_eq!(code, "56-B-12");
    }

    #[test]
    fn missing_commune_is_reported() {
        let mut id = identity();
        id.commune = None;
        let err = IdentityScheme::Generic.code(&id, "AB/1").unwrap_err();
        assert_eq!(
            err,
            FabricError::AttributeMissing {
                field: "commune",
                parcel: "AB/1".to_string()
            }
        );
    }

    #[test]
    fn assign_sets_section_number_and_code() {
        let mut id = ParcelIdentity {
            commune: Some("056".to_string()),
            ..Default::default()
        };
        IdentityScheme::Generic.assign(&mut id, "New1Section", 3, "new").unwrap();
        assert_eq!(id.number.as_deref(), Some("3"));
        assert_eq!(id.code.as_deref(), Some("056-New1Section-3"));
    }
}
