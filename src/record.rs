//! Bill records: the field/value mapping that travels from analysis through
//! human review to the storage backend.
//!
//! A [`BillRecord`] is an *ordered* map. The review surface shows fields in
//! insertion order and the storage backend appends columns in the order it
//! receives them, so order is part of the data, not presentation.

use crate::error::IntakeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Field holding the generated bill identifier.
pub const BILL_ID_FIELD: &str = "Unique ID";
pub const BILL_SOURCE_FIELD: &str = "Bill Source";
pub const BILL_GIVEN_BY_FIELD: &str = "Bill Given By";
pub const ADDED_BY_FIELD: &str = "Added By";
pub const HOD_APPROVAL_FIELD: &str = "HOD Approval";
pub const FINAL_APPROVAL_FIELD: &str = "Final Approval";
pub const HOD_APPROVAL_STATUS_FIELD: &str = "HOD Approval Status";
pub const FINAL_APPROVAL_STATUS_FIELD: &str = "Final Approval Status";

/// Initial value of both approval status fields.
pub const PENDING: &str = "Pending";

/// Whether the review surface must render `name` read-only.
///
/// The identifier and any field whose name contains `Status` are managed by
/// the workflow, never by the reviewer.
pub fn is_read_only_field(name: &str) -> bool {
    name == BILL_ID_FIELD || name.contains("Status")
}

// ── BillRecord ──────────────────────────────────────────────────────────────

/// Ordered field/value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillRecord {
    fields: Vec<(String, String)>,
}

/// Fields returned by the analysis backend, before the workflow adds its own.
pub type DraftFields = BillRecord;

impl BillRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`.
    ///
    /// An existing field keeps its position; a new field is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// The generated bill identifier, if present.
    pub fn bill_id(&self) -> Option<&str> {
        self.get(BILL_ID_FIELD)
    }

    /// Convert a backend `data` object, keeping its key order.
    ///
    /// Strings are taken verbatim, `null` becomes an empty string and any
    /// other JSON value is rendered as its JSON text.
    pub fn from_json_map(map: Map<String, Value>) -> Self {
        let mut record = Self::new();
        for (name, value) in map {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            record.insert(name, value);
        }
        record
    }

    /// Assemble the draft handed to human review.
    ///
    /// Layout: identifier, analysed fields in backend order, manual fields,
    /// then both approval statuses set to [`PENDING`]. A manual or status
    /// field the backend already returned is overwritten in place.
    pub fn draft(id: &BillId, analysed: &DraftFields, manual: &ManualFields) -> Self {
        let mut record = Self::new();
        record.insert(BILL_ID_FIELD, id.as_str());
        for (name, value) in analysed.iter() {
            record.insert(name, value);
        }
        record.insert(BILL_SOURCE_FIELD, manual.bill_source.as_str());
        record.insert(BILL_GIVEN_BY_FIELD, manual.bill_given_by.as_str());
        record.insert(ADDED_BY_FIELD, manual.added_by.as_str());
        record.insert(HOD_APPROVAL_FIELD, manual.hod_approval.as_str());
        record.insert(FINAL_APPROVAL_FIELD, manual.final_approval.as_str());
        record.insert(HOD_APPROVAL_STATUS_FIELD, PENDING);
        record.insert(FINAL_APPROVAL_STATUS_FIELD, PENDING);
        // The identifier must win even if the backend sent a field of the same name.
        record.insert(BILL_ID_FIELD, id.as_str());
        record
    }
}

impl Serialize for BillRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BillRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

// ── BillId ──────────────────────────────────────────────────────────────────

static BILL_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^BID-\d+$").unwrap());

static LAST_ISSUED_MS: AtomicU64 = AtomicU64::new(0);

/// Bill identifier: `BID-` followed by a millisecond epoch timestamp.
///
/// Ids issued by one process are strictly increasing. Across processes a
/// collision needs two hosts minting in the same millisecond, which is
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BillId(String);

impl BillId {
    /// Mint a fresh id.
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = LAST_ISSUED_MS.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match LAST_ISSUED_MS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Self(format!("BID-{next}")),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` has the `BID-<digits>` shape.
    pub fn is_well_formed(s: &str) -> bool {
        BILL_ID_PATTERN.is_match(s)
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ManualFields ────────────────────────────────────────────────────────────

/// Fields the operator supplies by hand before analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManualFields {
    pub bill_source: String,
    pub bill_given_by: String,
    pub added_by: String,
    pub hod_approval: String,
    pub final_approval: String,
}

impl ManualFields {
    /// `Bill Given By` and `Added By` are required.
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.bill_given_by.trim().is_empty() || self.added_by.trim().is_empty() {
            return Err(IntakeError::Validation(
                "Please fill all manual fields.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn manual() -> ManualFields {
        ManualFields {
            bill_source: "Email".into(),
            bill_given_by: "Priya".into(),
            added_by: "Sam".into(),
            hod_approval: "Dr. Rao".into(),
            final_approval: "Director".into(),
        }
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut r = BillRecord::new();
        r.insert("a", "1");
        r.insert("b", "2");
        r.insert("a", "3");
        let got: Vec<_> = r.iter().collect();
        assert_eq!(got, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn draft_layout() {
        let id = BillId::generate();
        let analysed: BillRecord = [("Vendor", "Acme"), ("Amount", "500")].into_iter().collect();
        let draft = BillRecord::draft(&id, &analysed, &manual());

        let names: Vec<_> = draft.names().collect();
        assert_eq!(
            names,
            vec![
                BILL_ID_FIELD,
                "Vendor",
                "Amount",
                BILL_SOURCE_FIELD,
                BILL_GIVEN_BY_FIELD,
                ADDED_BY_FIELD,
                HOD_APPROVAL_FIELD,
                FINAL_APPROVAL_FIELD,
                HOD_APPROVAL_STATUS_FIELD,
                FINAL_APPROVAL_STATUS_FIELD,
            ]
        );
        assert_eq!(draft.bill_id(), Some(id.as_str()));
        assert_eq!(draft.get(HOD_APPROVAL_STATUS_FIELD), Some(PENDING));
        assert_eq!(draft.get(FINAL_APPROVAL_STATUS_FIELD), Some(PENDING));
    }

    #[test]
    fn draft_identifier_cannot_be_spoofed_by_backend() {
        let id = BillId::generate();
        let analysed: BillRecord = [(BILL_ID_FIELD, "BID-1"), ("HOD Approval Status", "Approved")]
            .into_iter()
            .collect();
        let draft = BillRecord::draft(&id, &analysed, &manual());
        assert_eq!(draft.bill_id(), Some(id.as_str()));
        assert_eq!(draft.get(HOD_APPROVAL_STATUS_FIELD), Some(PENDING));
        // Still first.
        assert_eq!(draft.names().next(), Some(BILL_ID_FIELD));
    }

    #[test]
    fn read_only_rule() {
        assert!(is_read_only_field(BILL_ID_FIELD));
        assert!(is_read_only_field("HOD Approval Status"));
        assert!(is_read_only_field("Payment Status"));
        assert!(!is_read_only_field("Vendor"));
        assert!(!is_read_only_field("status")); // case-sensitive
    }

    #[test]
    fn json_map_keeps_order_and_stringifies() {
        let map: Map<String, Value> = serde_json::from_str(
            r#"{"Vendor":"Acme","Total":500,"Paid":true,"Notes":null}"#,
        )
        .unwrap();
        let r = BillRecord::from_json_map(map);
        let got: Vec<_> = r.iter().collect();
        assert_eq!(
            got,
            vec![
                ("Vendor", "Acme"),
                ("Total", "500"),
                ("Paid", "true"),
                ("Notes", "")
            ]
        );
    }

    #[test]
    fn serializes_as_ordered_object() {
        let r: BillRecord = [("z", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"z":"1","a":"2"}"#);
    }

    #[test]
    fn bill_ids_are_well_formed_and_distinct() {
        let ids: Vec<BillId> = (0..1000).map(|_| BillId::generate()).collect();
        assert!(ids.iter().all(|id| BillId::is_well_formed(id.as_str())));
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn bill_id_shape() {
        assert!(BillId::is_well_formed("BID-1718000000000"));
        assert!(!BillId::is_well_formed("BID-"));
        assert!(!BillId::is_well_formed("bid-123"));
        assert!(!BillId::is_well_formed("BID-12a"));
    }

    #[test]
    fn manual_fields_require_giver_and_adder() {
        assert!(manual().validate().is_ok());

        let mut m = manual();
        m.added_by = "  ".into();
        assert!(matches!(m.validate(), Err(IntakeError::Validation(_))));

        let mut m = manual();
        m.bill_given_by.clear();
        assert!(m.validate().is_err());

        // Optional fields may be empty.
        let m = ManualFields {
            bill_given_by: "A".into(),
            added_by: "B".into(),
            ..Default::default()
        };
        assert!(m.validate().is_ok());
    }
}
