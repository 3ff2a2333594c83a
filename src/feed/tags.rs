use std::collections::HashMap;

use crate::models::FeedItem;

/// Number of chips in the quick tag bar.
pub const QUICK_BAR_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Tag frequencies over `items`, most frequent first. Ties keep the order in
/// which tags were first seen.
pub fn tag_counts(items: &[FeedItem]) -> Vec<TagCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for tag in items.iter().flat_map(|item| item.tags.iter()) {
        let count = counts.entry(tag.as_str()).or_insert_with(|| {
            order.push(tag.as_str());
            0
        });
        *count += 1;
    }

    let mut result: Vec<TagCount> = order
        .into_iter()
        .map(|tag| TagCount {
            tag: tag.to_string(),
            count: counts[tag],
        })
        .collect();
    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

/// Saved tags first (with their current counts, zero when absent), then the
/// most frequent unsaved tags until `limit` chips are filled.
pub fn quick_bar_tags(items: &[FeedItem], saved: &[String], limit: usize) -> Vec<TagCount> {
    let frequent = tag_counts(items);
    let count_of = |tag: &str| {
        frequent
            .iter()
            .find(|t| t.tag == tag)
            .map(|t| t.count)
            .unwrap_or(0)
    };

    let mut result: Vec<TagCount> = saved
        .iter()
        .map(|tag| TagCount {
            tag: tag.clone(),
            count: count_of(tag),
        })
        .collect();

    for candidate in &frequent {
        if result.len() >= limit {
            break;
        }
        if !saved.contains(&candidate.tag) {
            result.push(candidate.clone());
        }
    }

    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderCount {
    pub sender: String,
    pub sender_email: String,
    pub count: usize,
}

/// Distinct senders by lowercased address, most items first.
pub fn sender_counts(items: &[FeedItem]) -> Vec<SenderCount> {
    let mut result: Vec<SenderCount> = Vec::new();

    for item in items.iter().filter(|i| !i.sender_email.is_empty()) {
        let address = item.sender_email.to_lowercase();
        match result.iter_mut().find(|s| s.sender_email == address) {
            Some(existing) => existing.count += 1,
            None => result.push(SenderCount {
                sender: item.sender.clone(),
                sender_email: address,
                count: 1,
            }),
        }
    }

    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}
