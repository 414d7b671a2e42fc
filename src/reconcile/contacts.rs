//! Contacts from the `people` and `buddylist` stores

use serde::Deserialize;
use serde_json::Value;

use super::de;
use super::entities::{Contact, ContactType};
use super::errors::{ReconcileError, ReconcileResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContactEntry {
    #[serde(deserialize_with = "de::opt_string")]
    display_name: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    email: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    mri: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    user_principal_name: Option<String>,
}

/// One contact from a `people` value or a `buddies` element.
pub fn extract_contact(value: &Value, origin_file: Option<&str>) -> ReconcileResult<Contact> {
    if !value.is_object() {
        return Err(ReconcileError::NotAnObject { kind: "contact" });
    }
    let entry: ContactEntry =
        serde_json::from_value(value.clone()).map_err(|e| ReconcileError::Malformed {
            kind: "contact",
            reason: e.to_string(),
        })?;

    let mri = entry
        .mri
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ReconcileError::MissingIdentity {
            kind: "contact",
            reason: "no mri".to_string(),
        })?;

    Ok(Contact {
        display_name: entry.display_name,
        email: entry.email,
        mri,
        user_principal_name: entry.user_principal_name,
        origin_file: origin_file.map(str::to_string),
        record_type: ContactType::Contact,
    })
}

/// Every buddy nested under `buddies`; each inherits the record's origin.
pub fn extract_buddies(
    value: &Value,
    origin_file: Option<&str>,
) -> Vec<ReconcileResult<Contact>> {
    match value.get("buddies") {
        Some(Value::Array(buddies)) => buddies
            .iter()
            .map(|buddy| extract_contact(buddy, origin_file))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_people_entry() {
        let value = json!({
            "displayName": "Ada Lovelace",
            "email": "ada@example.com",
            "mri": "8:orgid:ada",
            "userPrincipalName": "ada@example.com",
            "extra": [1, 2]
        });
        let contact = extract_contact(&value, Some("000003.log")).unwrap();
        assert_eq!(contact.mri, "8:orgid:ada");
        assert_eq!(contact.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(contact.origin_file.as_deref(), Some("000003.log"));
    }

    #[test]
    fn test_missing_mri() {
        let err = extract_contact(&json!({"displayName": "x"}), None).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingIdentity { kind: "contact", .. }));
    }

    #[test]
    fn test_buddies_inherit_origin() {
        let value = json!({
            "name": "Favorites",
            "buddies": [
                {"mri": "8:orgid:a", "displayName": "A"},
                {"displayName": "no id"},
                {"mri": "8:orgid:b"}
            ]
        });
        let results = extract_buddies(&value, Some("000007.ldb"));
        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());
        let b = results[2].as_ref().unwrap();
        assert_eq!(b.origin_file.as_deref(), Some("000007.ldb"));
    }

    #[test]
    fn test_no_buddies() {
        assert!(extract_buddies(&json!({"name": "x"}), None).is_empty());
    }
}
