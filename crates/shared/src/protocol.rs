use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, PendingAction, WorkbasketId, WorkbasketType};

pub const DEFAULT_PAGE_SIZE: u32 = 9;

pub const FILTER_DOMAIN: &str = "domain";
pub const FILTER_NAME_LIKE: &str = "name-like";
pub const FILTER_KEY_LIKE: &str = "key-like";
pub const FILTER_DESCRIPTION_LIKE: &str = "description-like";
pub const FILTER_OWNER_LIKE: &str = "owner-like";
pub const FILTER_TYPE: &str = "type";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbasketSummary {
    pub workbasket_id: WorkbasketId,
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkbasketType,
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub marked_for_deletion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkbasketPage {
    #[serde(default)]
    pub workbaskets: Vec<WorkbasketSummary>,
    #[serde(default)]
    pub page: PageMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorkbasketSortKey {
    #[default]
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "description")]
    Description,
    #[serde(rename = "owner")]
    Owner,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "custom-1")]
    Custom1,
    #[serde(rename = "custom-2")]
    Custom2,
    #[serde(rename = "custom-3")]
    Custom3,
    #[serde(rename = "custom-4")]
    Custom4,
    #[serde(rename = "org-level-1")]
    OrgLevel1,
    #[serde(rename = "org-level-2")]
    OrgLevel2,
    #[serde(rename = "org-level-3")]
    OrgLevel3,
    #[serde(rename = "org-level-4")]
    OrgLevel4,
}

impl WorkbasketSortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkbasketSortKey::Name => "name",
            WorkbasketSortKey::Key => "key",
            WorkbasketSortKey::Description => "description",
            WorkbasketSortKey::Owner => "owner",
            WorkbasketSortKey::Type => "type",
            WorkbasketSortKey::Domain => "domain",
            WorkbasketSortKey::Custom1 => "custom-1",
            WorkbasketSortKey::Custom2 => "custom-2",
            WorkbasketSortKey::Custom3 => "custom-3",
            WorkbasketSortKey::Custom4 => "custom-4",
            WorkbasketSortKey::OrgLevel1 => "org-level-1",
            WorkbasketSortKey::OrgLevel2 => "org-level-2",
            WorkbasketSortKey::OrgLevel3 => "org-level-3",
            WorkbasketSortKey::OrgLevel4 => "org-level-4",
        }
    }

    pub const ALL: [WorkbasketSortKey; 14] = [
        WorkbasketSortKey::Name,
        WorkbasketSortKey::Key,
        WorkbasketSortKey::Description,
        WorkbasketSortKey::Owner,
        WorkbasketSortKey::Type,
        WorkbasketSortKey::Domain,
        WorkbasketSortKey::Custom1,
        WorkbasketSortKey::Custom2,
        WorkbasketSortKey::Custom3,
        WorkbasketSortKey::Custom4,
        WorkbasketSortKey::OrgLevel1,
        WorkbasketSortKey::OrgLevel2,
        WorkbasketSortKey::OrgLevel3,
        WorkbasketSortKey::OrgLevel4,
    ];
}

impl FromStr for WorkbasketSortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown workbasket sort key '{value}'"))
    }
}

/// Sort order for a list. `K` restricts `sort_by` to the fields the entity
/// type can be sorted on; the default key applies when nothing else was set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sorting<K> {
    #[serde(rename = "sort-by")]
    pub sort_by: K,
    pub order: Direction,
}

impl<K> Sorting<K> {
    pub fn new(sort_by: K, order: Direction) -> Self {
        Self { sort_by, order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            FilterValue::Single(value) => vec![value.as_str()],
            FilterValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::Many(values)
    }
}

impl<const N: usize> From<[&str; N]> for FilterValue {
    fn from(values: [&str; N]) -> Self {
        FilterValue::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterCriteria(BTreeMap<String, FilterValue>);

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self::new().with(FILTER_DOMAIN, FilterValue::Many(vec![domain.into()]))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Applies a partial update on top of the held criteria.
    ///
    /// Keys missing from `partial` keep their previous values. A previously
    /// held `domain` always survives, even when `partial` carries its own
    /// (possibly empty) domain entry.
    pub fn merge(&mut self, partial: FilterCriteria) {
        let domain = self.0.get(FILTER_DOMAIN).cloned();
        self.0.extend(partial.0);
        if let Some(domain) = domain {
            self.0.insert(FILTER_DOMAIN.to_string(), domain);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor {
    pub page: u32,
    #[serde(rename = "page-size")]
    pub page_size: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// The `(filter, sort, page)` triple a list fetch is issued with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkbasketQueryParameters {
    pub filter: FilterCriteria,
    pub sort: Sorting<WorkbasketSortKey>,
    pub page: PageCursor,
}

impl WorkbasketQueryParameters {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("sort-by".to_string(), self.sort.sort_by.as_str().to_string()),
            ("order".to_string(), self.sort.order.as_str().to_string()),
            ("page".to_string(), self.page.page.to_string()),
            ("page-size".to_string(), self.page.page_size.to_string()),
        ];
        for (key, value) in self.filter.iter() {
            for item in value.values() {
                if !item.is_empty() {
                    pairs.push((key.to_string(), item.to_string()));
                }
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessIdRecord {
    pub access_id: String,
    #[serde(default)]
    pub name: String,
}

impl AccessIdRecord {
    pub fn new(access_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            name: name.into(),
        }
    }

    /// The canonical `{accessId: "", name: ""}` record.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.access_id.is_empty() && self.name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAccessIdValue {
    #[serde(default)]
    pub access_id: Option<String>,
    #[serde(default, alias = "name")]
    pub access_name: Option<String>,
}

/// Preset handed to a lookup by the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavedAccessId {
    Structured(SavedAccessIdValue),
    Scalar(String),
}

impl SavedAccessId {
    /// Extracts the confirmed value a lookup starts from.
    ///
    /// A structured preset wins whenever it carries an access id, including
    /// an empty one. A bare scalar comes next, then the empty string.
    pub fn resolve(preset: Option<&SavedAccessId>) -> AccessIdRecord {
        match preset {
            Some(SavedAccessId::Structured(value)) => AccessIdRecord {
                access_id: value.access_id.clone().unwrap_or_default(),
                name: value.access_name.clone().unwrap_or_default(),
            },
            Some(SavedAccessId::Scalar(access_id)) => AccessIdRecord::new(access_id.clone(), ""),
            None => AccessIdRecord::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SelectionIntent {
    SelectEntity(WorkbasketId),
    DeselectEntity,
    CreateEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionState {
    pub selected_id: Option<WorkbasketId>,
    pub action: PendingAction,
}

impl SelectionState {
    pub fn shows_detail(&self) -> bool {
        self.selected_id.is_some() || self.action == PendingAction::Create
    }

    /// Container-side effect of an intent.
    pub fn apply(&mut self, intent: &SelectionIntent) {
        match intent {
            SelectionIntent::SelectEntity(id) => {
                self.selected_id = Some(id.clone());
                self.action = PendingAction::Read;
            }
            SelectionIntent::DeselectEntity => {
                self.selected_id = None;
                self.action = PendingAction::Read;
            }
            SelectionIntent::CreateEntity => {
                self.selected_id = None;
                self.action = PendingAction::Create;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_keys_missing_from_partial() {
        let mut held = FilterCriteria::new().with(FILTER_DOMAIN, ["123"]);
        held.merge(FilterCriteria::new().with(FILTER_NAME_LIKE, ["workbasket"]));

        let expected = FilterCriteria::new()
            .with(FILTER_DOMAIN, ["123"])
            .with(FILTER_NAME_LIKE, ["workbasket"]);
        assert_eq!(held, expected);
    }

    #[test]
    fn merge_keeps_previous_domain_over_empty_incoming_domain() {
        let mut held = FilterCriteria::new().with(FILTER_DOMAIN, ["123"]);
        held.merge(
            FilterCriteria::new()
                .with(FILTER_NAME_LIKE, ["workbasket"])
                .with(FILTER_DOMAIN, [""]),
        );

        assert_eq!(held.get(FILTER_DOMAIN), Some(&FilterValue::from(["123"])));
        assert_eq!(
            held.get(FILTER_NAME_LIKE),
            Some(&FilterValue::from(["workbasket"]))
        );
    }

    #[test]
    fn merge_takes_incoming_domain_when_none_was_held() {
        let mut held = FilterCriteria::new();
        held.merge(FilterCriteria::for_domain("DOMAIN_A"));
        assert_eq!(held, FilterCriteria::for_domain("DOMAIN_A"));
    }

    #[test]
    fn merge_overwrites_other_keys() {
        let mut held = FilterCriteria::new().with(FILTER_NAME_LIKE, ["old"]);
        held.merge(FilterCriteria::new().with(FILTER_NAME_LIKE, "new"));
        assert_eq!(held.get(FILTER_NAME_LIKE), Some(&FilterValue::from("new")));
    }

    #[test]
    fn sorting_uses_wire_names() {
        let sort = Sorting::new(WorkbasketSortKey::Type, Direction::Desc);
        let json = serde_json::to_value(sort).expect("encode");
        assert_eq!(json, serde_json::json!({"sort-by": "type", "order": "desc"}));
        assert_eq!(
            Sorting::<WorkbasketSortKey>::default(),
            Sorting::new(WorkbasketSortKey::Name, Direction::Asc)
        );
    }

    #[test]
    fn sort_keys_parse_from_wire_names() {
        for key in WorkbasketSortKey::ALL {
            assert_eq!(key.as_str().parse::<WorkbasketSortKey>(), Ok(key));
        }
        assert_eq!("Org-Level-2".parse(), Ok(WorkbasketSortKey::OrgLevel2));
        assert!("created".parse::<WorkbasketSortKey>().is_err());
        assert_eq!("DESC".parse(), Ok(Direction::Desc));
    }

    #[test]
    fn filter_values_decode_from_string_or_list() {
        let filter: FilterCriteria =
            serde_json::from_str(r#"{"domain":["A","B"],"type":"GROUP"}"#).expect("decode");
        assert_eq!(filter.get("domain"), Some(&FilterValue::from(["A", "B"])));
        assert_eq!(filter.get("type"), Some(&FilterValue::from("GROUP")));
    }

    #[test]
    fn query_pairs_repeat_lists_and_skip_empty_values() {
        let params = WorkbasketQueryParameters {
            filter: FilterCriteria::new()
                .with(FILTER_DOMAIN, ["A", "B"])
                .with(FILTER_NAME_LIKE, [""]),
            sort: Sorting::new(WorkbasketSortKey::Key, Direction::Desc),
            page: PageCursor {
                page: 3,
                page_size: 20,
            },
        };

        assert_eq!(
            params.query_pairs(),
            vec![
                ("sort-by".to_string(), "key".to_string()),
                ("order".to_string(), "desc".to_string()),
                ("page".to_string(), "3".to_string()),
                ("page-size".to_string(), "20".to_string()),
                ("domain".to_string(), "A".to_string()),
                ("domain".to_string(), "B".to_string()),
            ]
        );
    }

    #[test]
    fn structured_preset_wins_even_with_empty_access_id() {
        let preset = SavedAccessId::Structured(SavedAccessIdValue {
            access_id: Some(String::new()),
            access_name: Some("Nobody".into()),
        });
        assert_eq!(
            SavedAccessId::resolve(Some(&preset)),
            AccessIdRecord::new("", "Nobody")
        );
    }

    #[test]
    fn preset_falls_back_to_scalar_then_empty() {
        let scalar = SavedAccessId::Scalar("user-1".into());
        assert_eq!(
            SavedAccessId::resolve(Some(&scalar)),
            AccessIdRecord::new("user-1", "")
        );
        assert_eq!(SavedAccessId::resolve(None), AccessIdRecord::empty());

        let without_id = SavedAccessId::Structured(SavedAccessIdValue {
            access_id: None,
            access_name: Some("ignored".into()),
        });
        assert_eq!(
            SavedAccessId::resolve(Some(&without_id)).access_id,
            String::new()
        );
    }

    #[test]
    fn saved_access_id_decodes_all_shapes() {
        let structured: SavedAccessId =
            serde_json::from_str(r#"{"accessId":"teamlead-1","accessName":"Lead"}"#)
                .expect("structured");
        assert!(matches!(structured, SavedAccessId::Structured(_)));

        let scalar: SavedAccessId = serde_json::from_str(r#""user-1""#).expect("scalar");
        assert_eq!(scalar, SavedAccessId::Scalar("user-1".into()));
    }

    #[test]
    fn selection_reducer_tracks_detail_visibility() {
        let mut state = SelectionState::default();
        assert!(!state.shows_detail());

        state.apply(&SelectionIntent::CreateEntity);
        assert!(state.shows_detail());
        assert_eq!(state.selected_id, None);

        state.apply(&SelectionIntent::SelectEntity("WBI:1".into()));
        assert_eq!(state.selected_id, Some(WorkbasketId::new("WBI:1")));
        assert_eq!(state.action, PendingAction::Read);

        state.apply(&SelectionIntent::DeselectEntity);
        assert!(!state.shows_detail());
    }
}
