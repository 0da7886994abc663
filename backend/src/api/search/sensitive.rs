//! Coordinate obscuring for records flagged as sensitive.

use common::search_result::Document;

/// Prepares `doc` for output. With `include_sensitive` the raw coordinates of
/// a sensitive record replace the public ones; without it every field listed in
/// `sensitive_fields` and the raw coordinates are removed.
pub fn apply_sensitivity(doc: &mut Document, include_sensitive: bool, sensitive_fields: &[String]) {
    if include_sensitive {
        if doc.has_sensitive_coordinates() {
            doc.latitude = doc.sensitive_latitude;
            doc.longitude = doc.sensitive_longitude;
        }
        return;
    }
    doc.sensitive_latitude = None;
    doc.sensitive_longitude = None;
    for field in sensitive_fields {
        doc.clear(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::search_result::FieldValue;

    fn sensitive_doc() -> Document {
        let mut doc = Document::new("1", "dr1").with_field("sensitive_locality", FieldValue::Str("Back paddock".into()));
        doc.latitude = Some(-33.8);
        doc.longitude = Some(151.2);
        doc.sensitive_latitude = Some(-33.8123);
        doc.sensitive_longitude = Some(151.2345);
        doc
    }

    #[test]
    fn redacts_when_sensitive_excluded() {
        let fields = vec!["sensitive_locality".to_string()];
        let mut doc = sensitive_doc();
        apply_sensitivity(&mut doc, false, &fields);
        assert_eq!(doc.latitude, Some(-33.8));
        assert_eq!(doc.sensitive_latitude, None);
        assert!(doc.get("sensitive_locality").is_none());
    }

    #[test]
    fn reveals_raw_coordinates_when_included() {
        let mut doc = sensitive_doc();
        apply_sensitivity(&mut doc, true, &[]);
        assert_eq!(doc.latitude, Some(-33.8123));
        assert_eq!(doc.longitude, Some(151.2345));
        assert!(doc.get("sensitive_locality").is_some());
    }
}
