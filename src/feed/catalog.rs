use crate::models::FeedItem;

/// Distinct course levels in first-seen order, compared case-insensitively.
pub fn unique_levels(items: &[FeedItem]) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for level in items.iter().filter_map(|i| i.level.as_deref()) {
        let level = level.trim();
        if level.is_empty() {
            continue;
        }
        if !levels.iter().any(|l| l.eq_ignore_ascii_case(level)) {
            levels.push(level.to_string());
        }
    }
    levels
}

pub fn filter_by_level(items: &[FeedItem], level: Option<&str>) -> Vec<FeedItem> {
    match level {
        None => items.to_vec(),
        Some(level) => items
            .iter()
            .filter(|i| {
                i.level
                    .as_deref()
                    .is_some_and(|l| l.trim().eq_ignore_ascii_case(level))
            })
            .cloned()
            .collect(),
    }
}

/// Advance a level selection: none -> first level -> ... -> last -> none.
pub fn next_level(levels: &[String], current: Option<&str>) -> Option<String> {
    let position = current.and_then(|c| levels.iter().position(|l| l.eq_ignore_ascii_case(c)));
    match position {
        None => levels.first().cloned(),
        Some(i) => levels.get(i + 1).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: &str, level: Option<&str>) -> FeedItem {
        FeedItem {
            id: id.into(),
            level: level.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn levels_deduplicate_ignoring_case() {
        let items = vec![
            course("1", Some("Beginner")),
            course("2", Some("advanced")),
            course("3", Some("beginner")),
            course("4", None),
            course("5", Some(" ")),
        ];
        assert_eq!(unique_levels(&items), vec!["Beginner", "advanced"]);

        let beginners = filter_by_level(&items, Some("BEGINNER"));
        assert_eq!(beginners.len(), 2);
        assert_eq!(filter_by_level(&items, None).len(), 5);
    }

    #[test]
    fn level_selection_cycles_back_to_all() {
        let levels = vec!["Beginner".to_string(), "Advanced".to_string()];
        let first = next_level(&levels, None);
        assert_eq!(first.as_deref(), Some("Beginner"));
        let second = next_level(&levels, first.as_deref());
        assert_eq!(second.as_deref(), Some("Advanced"));
        assert_eq!(next_level(&levels, second.as_deref()), None);
    }
}
