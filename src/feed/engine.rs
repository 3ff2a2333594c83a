//! Filtering, sorting and email grouping of feed items.
//!
//! Everything here is a pure function of its inputs: the same items, filter
//! state and clock always produce the same groups, so callers can cache the
//! output and recompute only when one of those changes.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{FeedItem, ItemType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Any,
    Upcoming,
    Past,
}

impl StatusFilter {
    pub fn next(self) -> Self {
        match self {
            StatusFilter::Any => StatusFilter::Upcoming,
            StatusFilter::Upcoming => StatusFilter::Past,
            StatusFilter::Past => StatusFilter::Any,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::Any => "any",
            StatusFilter::Upcoming => "upcoming",
            StatusFilter::Past => "past",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Recent,
    /// Keeps input order. Only meaningful for server-ranked search results.
    Relevance,
}

impl SortOption {
    pub fn toggle(self) -> Self {
        match self {
            SortOption::Recent => SortOption::Relevance,
            SortOption::Relevance => SortOption::Recent,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOption::Recent => "recent",
            SortOption::Relevance => "relevance",
        }
    }
}

/// User-selected narrowing of a feed. Senders are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub types: BTreeSet<ItemType>,
    pub status: StatusFilter,
    pub sort: SortOption,
    pub senders: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl FilterState {
    pub fn toggle_type(&mut self, item_type: ItemType) {
        if !self.types.remove(&item_type) {
            self.types.insert(item_type);
        }
    }

    pub fn toggle_tag(&mut self, tag: &str) {
        if !self.tags.remove(tag) {
            self.tags.insert(tag.to_string());
        }
    }

    pub fn toggle_sender(&mut self, sender_email: &str) {
        let sender = sender_email.to_lowercase();
        if !self.senders.remove(&sender) {
            self.senders.insert(sender);
        }
    }

    pub fn clear_tags(&mut self) {
        self.tags.clear();
    }

    pub fn is_unfiltered(&self) -> bool {
        self.types.is_empty()
            && self.status == StatusFilter::Any
            && self.senders.is_empty()
            && self.tags.is_empty()
    }
}

/// Where the items being shaped came from.
#[derive(Debug, Clone, Copy)]
pub enum ItemSource<'a> {
    /// A page of the regular feed.
    Feed(&'a [FeedItem]),
    /// Server-ranked search results; their order is the ranking.
    Search(&'a [FeedItem]),
}

impl<'a> ItemSource<'a> {
    fn items(&self) -> &'a [FeedItem] {
        match self {
            ItemSource::Feed(items) | ItemSource::Search(items) => items,
        }
    }

    fn is_ranked(&self) -> bool {
        matches!(self, ItemSource::Search(_))
    }
}

/// Items that came out of the same source email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailGroup {
    pub email_id: String,
    pub email_subject: String,
    pub sender: String,
    pub sender_email: String,
    pub received_at: Option<DateTime<Utc>>,
    pub items: Vec<FeedItem>,
}

impl EmailGroup {
    fn from_first(item: &FeedItem) -> Self {
        Self {
            email_id: item.email_id.clone(),
            email_subject: item.email_subject.clone(),
            sender: item.sender.clone(),
            sender_email: item.sender_email.clone(),
            received_at: item.received_at,
            items: Vec::new(),
        }
    }
}

fn passes_type(item: &FeedItem, filters: &FilterState, locked_type: Option<ItemType>) -> bool {
    match locked_type {
        Some(locked) => item.item_type == locked,
        None => filters.types.is_empty() || filters.types.contains(&item.item_type),
    }
}

// Items without a start time, and anything that is not an event, always pass.
fn passes_status(item: &FeedItem, status: StatusFilter, now: DateTime<Utc>) -> bool {
    if item.item_type != ItemType::Event {
        return true;
    }
    match (status, item.start_time) {
        (StatusFilter::Any, _) | (_, None) => true,
        (StatusFilter::Upcoming, Some(start)) => start >= now,
        (StatusFilter::Past, Some(start)) => start < now,
    }
}

fn passes_sender(item: &FeedItem, senders: &BTreeSet<String>) -> bool {
    senders.is_empty() || senders.contains(&item.sender_email.to_lowercase())
}

fn passes_tags(item: &FeedItem, tags: &BTreeSet<String>) -> bool {
    tags.is_empty() || item.has_any_tag(tags)
}

/// Apply every predicate of `filters` and order the survivors.
///
/// `locked_type` scopes a view to one item type and overrides `filters.types`.
/// Ranked sources keep their order whatever the sort key; otherwise "recent"
/// sorts by `received_at` descending (stable, undated items last) and
/// "relevance" leaves the input order untouched.
pub fn filter_items(
    source: ItemSource<'_>,
    filters: &FilterState,
    locked_type: Option<ItemType>,
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let mut result: Vec<FeedItem> = source
        .items()
        .iter()
        .filter(|item| passes_type(item, filters, locked_type))
        .filter(|item| passes_status(item, filters.status, now))
        .filter(|item| passes_sender(item, &filters.senders))
        .filter(|item| passes_tags(item, &filters.tags))
        .cloned()
        .collect();

    if !source.is_ranked() && filters.sort == SortOption::Recent {
        result.sort_by(|a, b| b.received_at.cmp(&a.received_at));
    }

    result
}

/// Bucket items by `email_id`, keeping item order within a group and the
/// first item's email metadata. Groups are ordered newest email first; ties
/// keep first-seen order.
pub fn group_by_email(items: Vec<FeedItem>) -> Vec<EmailGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<EmailGroup> = Vec::new();

    for item in items {
        let slot = match index.get(&item.email_id) {
            Some(&slot) => slot,
            None => {
                groups.push(EmailGroup::from_first(&item));
                index.insert(item.email_id.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].items.push(item);
    }

    groups.sort_by(|a, b| b.received_at.cmp(&a.received_at));
    groups
}
