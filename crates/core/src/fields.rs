//! Field selection and differential updates.
//!
//! Every persistable entity describes its fields once, in a static
//! [`FieldDescriptor`] table. Updates are built from that table and a
//! caller-supplied [`FieldSet`]; a field outside the set is never read into an
//! update, so two writers with disjoint sets cannot clobber each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::ObjectId;

/// Field name → value, ordered by name.
pub type Document = BTreeMap<String, FieldValue>;

/// One persistable field of an entity type.
pub struct FieldDescriptor<E> {
    pub name: &'static str,
    /// An empty reference is removed from the document instead of being set
    /// to null.
    pub omit_empty: bool,
    pub get: fn(&E) -> FieldValue,
    pub set: fn(&mut E, FieldValue) -> Result<(), CoreError>,
}

/// An entity stored as one document in a named collection.
///
/// The identifier is the document key and never appears in [`Persist::fields`].
/// Fields missing from the table (derived or transient state) are never
/// persisted.
pub trait Persist: Default + 'static {
    const COLLECTION: &'static str;

    fn fields() -> &'static [FieldDescriptor<Self>];

    fn id(&self) -> Option<ObjectId>;

    fn set_id(&mut self, id: ObjectId);
}

/// The allow-list of field names a single update may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeSet<String>);

impl FieldSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every persistable field of `E`.
    pub fn all<E: Persist>() -> Self {
        E::fields().iter().map(|f| f.name).collect()
    }

    pub fn insert(&mut self, field: impl Into<String>) -> bool {
        self.0.insert(field.into())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for FieldSet {
    fn from(fields: [S; N]) -> Self {
        fields.into_iter().collect()
    }
}

/// A merge update against one document: fields to assign and fields to
/// remove. `unset` is `None` rather than empty when nothing is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeUpdate {
    pub set: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unset: Option<BTreeSet<String>>,
}

impl MergeUpdate {
    pub fn is_noop(&self) -> bool {
        self.set.is_empty() && self.unset.is_none()
    }

    pub fn removes(&self, field: &str) -> bool {
        self.unset.as_ref().is_some_and(|u| u.contains(field))
    }
}

/// Flat view of the selected fields. Empty references come out as `Null`;
/// there is no removal in this form.
pub fn select_fields<E: Persist>(entity: &E, fields: &FieldSet) -> Document {
    E::fields()
        .iter()
        .filter(|f| fields.contains(f.name))
        .map(|f| (f.name.to_string(), (f.get)(entity).normalized()))
        .collect()
}

/// Builds the merge update for the selected fields of `entity`.
///
/// An empty reference is removed when its field is flagged `omit_empty` and
/// assigned `Null` otherwise. Everything else is assigned as-is.
pub fn select_fields_all<E: Persist>(entity: &E, fields: &FieldSet) -> MergeUpdate {
    let mut set = Document::new();
    let mut unset = BTreeSet::new();

    for field in E::fields() {
        if !fields.contains(field.name) {
            continue;
        }

        match (field.get)(entity) {
            FieldValue::Ref(None) if field.omit_empty => {
                unset.insert(field.name.to_string());
            }
            value => {
                set.insert(field.name.to_string(), value.normalized());
            }
        }
    }

    MergeUpdate {
        set,
        unset: (!unset.is_empty()).then_some(unset),
    }
}

/// Assignment-only document of every persistable field, as written by a full
/// commit or an insert. Empty `omit_empty` references are left out entirely.
pub fn assign_fields<E: Persist>(entity: &E) -> Document {
    E::fields()
        .iter()
        .filter_map(|f| {
            let value = (f.get)(entity);
            if f.omit_empty && value.is_empty_ref() {
                None
            } else {
                Some((f.name.to_string(), value.normalized()))
            }
        })
        .collect()
}

/// Rebuilds an entity from a stored document. Missing fields keep their
/// default; unknown keys are ignored.
pub fn load_document<E: Persist>(id: ObjectId, mut document: Document) -> Result<E, CoreError> {
    let mut entity = E::default();
    entity.set_id(id);
    for field in E::fields() {
        if let Some(value) = document.remove(field.name) {
            (field.set)(&mut entity, value)?;
        }
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Volume {
        id: Option<ObjectId>,
        label: String,
        size: i64,
        host: Option<ObjectId>,
        parent: Option<ObjectId>,
        // not persisted
        attached: bool,
    }

    static VOLUME_FIELDS: &[FieldDescriptor<Volume>] = &[
        FieldDescriptor {
            name: "label",
            omit_empty: false,
            get: |v| FieldValue::Text(v.label.clone()),
            set: |v, value| {
                v.label = value.into_text("label")?;
                Ok(())
            },
        },
        FieldDescriptor {
            name: "size",
            omit_empty: false,
            get: |v| FieldValue::Integer(v.size),
            set: |v, value| {
                v.size = value.into_integer("size")?;
                Ok(())
            },
        },
        FieldDescriptor {
            name: "host",
            omit_empty: true,
            get: |v| FieldValue::Ref(v.host),
            set: |v, value| {
                v.host = value.into_ref("host")?;
                Ok(())
            },
        },
        FieldDescriptor {
            name: "parent",
            omit_empty: false,
            get: |v| FieldValue::Ref(v.parent),
            set: |v, value| {
                v.parent = value.into_ref("parent")?;
                Ok(())
            },
        },
    ];

    impl Persist for Volume {
        const COLLECTION: &'static str = "volumes";

        fn fields() -> &'static [FieldDescriptor<Self>] {
            VOLUME_FIELDS
        }

        fn id(&self) -> Option<ObjectId> {
            self.id
        }

        fn set_id(&mut self, id: ObjectId) {
            self.id = Some(id);
        }
    }

    fn volume() -> Volume {
        Volume {
            id: Some(ObjectId::new()),
            label: "data".into(),
            size: 40,
            host: None,
            parent: None,
            attached: true,
        }
    }

    #[test]
    fn selection_limits_assignment() {
        let update = select_fields_all(&volume(), &FieldSet::from(["label"]));
        assert_eq!(update.set.len(), 1);
        assert_eq!(update.set.get("label"), Some(&FieldValue::from("data")));
        assert!(update.unset.is_none());
    }

    #[test]
    fn empty_omit_ref_is_removed() {
        let update = select_fields_all(&volume(), &FieldSet::from(["host", "size"]));
        assert!(update.removes("host"));
        assert!(!update.set.contains_key("host"));
        assert_eq!(update.set.get("size"), Some(&FieldValue::Integer(40)));
    }

    #[test]
    fn empty_plain_ref_is_set_to_null() {
        let update = select_fields_all(&volume(), &FieldSet::from(["parent"]));
        assert_eq!(update.set.get("parent"), Some(&FieldValue::Null));
        assert!(update.unset.is_none());
    }

    #[test]
    fn present_ref_is_assigned() {
        let mut v = volume();
        let host = ObjectId::new();
        v.host = Some(host);
        let update = select_fields_all(&v, &FieldSet::from(["host"]));
        assert_eq!(update.set.get("host"), Some(&FieldValue::Ref(Some(host))));
        assert!(update.unset.is_none());
    }

    #[test]
    fn assignment_and_removal_are_disjoint() {
        let all = FieldSet::all::<Volume>();
        for host in [None, Some(ObjectId::new())] {
            for parent in [None, Some(ObjectId::new())] {
                let mut v = volume();
                v.host = host;
                v.parent = parent;
                let update = select_fields_all(&v, &all);
                for name in all.iter() {
                    let in_set = update.set.contains_key(name);
                    let in_unset = update.removes(name);
                    assert!(in_set ^ in_unset, "{name} must land in exactly one half");
                }
            }
        }
    }

    #[test]
    fn unselected_and_unknown_fields_never_leak() {
        let fields = FieldSet::from(["label", "attached", "id"]);
        let update = select_fields_all(&volume(), &fields);
        assert_eq!(update.set.keys().collect::<Vec<_>>(), vec!["label"]);
        assert!(update.unset.is_none());

        let empty = select_fields_all(&volume(), &FieldSet::new());
        assert!(empty.is_noop());
    }

    #[test]
    fn flat_selection_nulls_empty_refs() {
        let doc = select_fields(&volume(), &FieldSet::from(["host", "parent", "size"]));
        assert_eq!(doc.get("host"), Some(&FieldValue::Null));
        assert_eq!(doc.get("parent"), Some(&FieldValue::Null));
        assert_eq!(doc.get("size"), Some(&FieldValue::Integer(40)));
        assert!(!doc.contains_key("label"));
    }

    #[test]
    fn full_assignment_skips_empty_omit_refs() {
        let doc = assign_fields(&volume());
        assert!(!doc.contains_key("host"));
        assert_eq!(doc.get("parent"), Some(&FieldValue::Null));
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn load_restores_persisted_fields_only() {
        let mut saved = volume();
        saved.host = Some(ObjectId::new());
        let id = saved.id.unwrap();

        let mut doc = assign_fields(&saved);
        doc.insert("stray".into(), FieldValue::from("ignored"));
        let loaded: Volume = load_document(id, doc).unwrap();

        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.label, saved.label);
        assert_eq!(loaded.host, saved.host);
        assert!(!loaded.attached);
    }

    #[test]
    fn load_rejects_wrong_shape() {
        let mut doc = Document::new();
        doc.insert("size".into(), FieldValue::from("forty"));
        assert!(load_document::<Volume>(ObjectId::new(), doc).is_err());
    }

    #[test]
    fn wire_shape_omits_empty_removal() {
        let update = select_fields_all(&volume(), &FieldSet::from(["label"]));
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("set").is_some());
        assert!(json.get("unset").is_none());
    }
}
