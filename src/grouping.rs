//! Group-by over tuples of identifiers.
//!
//! Groups come back in a `BTreeMap`, so iteration order is the key order and
//! does not depend on input order. Within a group, members keep input order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{AreaScore, AtomicScore, DimensionScore};

/// Identifier fields a record can be grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    PolicyAreaId,
    DimensionId,
}

/// Composite group key, one component per grouping field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Vec<String>);

impl GroupKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn part(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Records that expose identifier fields for grouping.
pub trait Groupable {
    fn group_field(&self, field: GroupField) -> Option<&str>;
}

impl Groupable for AtomicScore {
    fn group_field(&self, field: GroupField) -> Option<&str> {
        match field {
            GroupField::PolicyAreaId => Some(&self.policy_area_id),
            GroupField::DimensionId => Some(&self.dimension_id),
        }
    }
}

impl Groupable for DimensionScore {
    fn group_field(&self, field: GroupField) -> Option<&str> {
        match field {
            GroupField::PolicyAreaId => Some(&self.policy_area_id),
            GroupField::DimensionId => Some(&self.dimension_id),
        }
    }
}

impl Groupable for AreaScore {
    fn group_field(&self, field: GroupField) -> Option<&str> {
        match field {
            GroupField::PolicyAreaId => Some(&self.area_id),
            GroupField::DimensionId => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupingError {
    #[error("no grouping fields given")]
    NoFields,
    #[error("record {index} has no value for {field:?}")]
    MissingField { index: usize, field: GroupField },
    #[error("record {index} has an empty value for {field:?}")]
    EmptyField { index: usize, field: GroupField },
}

/// Group records by the values of `fields`, in order.
pub fn group_by<'a, T: Groupable>(
    items: &'a [T],
    fields: &[GroupField],
) -> Result<BTreeMap<GroupKey, Vec<&'a T>>, GroupingError> {
    if fields.is_empty() {
        return Err(GroupingError::NoFields);
    }
    let mut groups: BTreeMap<GroupKey, Vec<&'a T>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        let mut parts = Vec::with_capacity(fields.len());
        for &field in fields {
            let value = item
                .group_field(field)
                .ok_or(GroupingError::MissingField { index, field })?;
            if value.trim().is_empty() {
                return Err(GroupingError::EmptyField { index, field });
            }
            parts.push(value.to_string());
        }
        groups.entry(GroupKey(parts)).or_default().push(item);
    }
    Ok(groups)
}

/// Members of one declared group, plus the declared ids that had no record.
#[derive(Debug)]
pub struct MembershipGroup<'a, T> {
    pub members: Vec<&'a T>,
    pub missing: Vec<String>,
}

/// Group records by declared membership lists (`group id -> member ids`).
///
/// A record may belong to several groups. Members follow the declared order.
pub fn group_by_membership<'a, T, F>(
    items: &'a [T],
    memberships: &[(String, Vec<String>)],
    id_of: F,
) -> BTreeMap<String, MembershipGroup<'a, T>>
where
    F: Fn(&T) -> &str,
{
    let mut index: BTreeMap<&str, &'a T> = BTreeMap::new();
    for item in items {
        index.entry(id_of(item)).or_insert(item);
    }
    let mut out = BTreeMap::new();
    for (group_id, member_ids) in memberships {
        let mut members = Vec::with_capacity(member_ids.len());
        let mut missing = Vec::new();
        for id in member_ids {
            match index.get(id.as_str()) {
                Some(item) => members.push(*item),
                None => missing.push(id.clone()),
            }
        }
        out.insert(group_id.clone(), MembershipGroup { members, missing });
    }
    out
}
