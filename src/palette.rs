//! Command palette: quick navigation plus debounced quick search.

use crate::app::View;
use crate::models::FeedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub shortcut: char,
    pub view: View,
}

pub const QUICK_ACTIONS: [QuickAction; 6] = [
    QuickAction { label: "Go to Events", shortcut: 'E', view: View::Events },
    QuickAction { label: "Go to Courses", shortcut: 'C', view: View::Courses },
    QuickAction { label: "Go to Blogs", shortcut: 'B', view: View::Blogs },
    QuickAction { label: "Go to Home", shortcut: 'H', view: View::Home },
    QuickAction { label: "Go to Metrics", shortcut: 'M', view: View::Metrics },
    QuickAction { label: "Go to Settings", shortcut: 'S', view: View::Settings },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaletteSection {
    #[default]
    Actions,
    Results,
}

/// What the caller should do after a palette interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteOutcome {
    None,
    /// Schedule a debounced search. Results must be delivered with the same
    /// generation or they are dropped.
    Search { query: String, generation: u64 },
    /// Query went blank; cancel any pending search.
    ClearResults,
    Navigate(View),
    OpenItem(Box<FeedItem>),
    Closed,
}

#[derive(Debug, Default)]
pub struct CommandPalette {
    open: bool,
    query: String,
    section: PaletteSection,
    selected: usize,
    results: Vec<FeedItem>,
    searching: bool,
    generation: u64,
}

impl CommandPalette {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn section(&self) -> PaletteSection {
        self.section
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn results(&self) -> &[FeedItem] {
        &self.results
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn open(&mut self) {
        self.open = true;
        self.reset();
    }

    pub fn close(&mut self) -> PaletteOutcome {
        self.open = false;
        self.reset();
        PaletteOutcome::Closed
    }

    fn reset(&mut self) {
        self.query.clear();
        self.results.clear();
        self.section = PaletteSection::Actions;
        self.selected = 0;
        self.searching = false;
        self.generation += 1;
    }

    pub fn input_char(&mut self, c: char) -> PaletteOutcome {
        self.query.push(c);
        self.query_changed()
    }

    pub fn backspace(&mut self) -> PaletteOutcome {
        if self.query.pop().is_none() {
            return PaletteOutcome::None;
        }
        self.query_changed()
    }

    fn query_changed(&mut self) -> PaletteOutcome {
        self.generation += 1;
        if self.query.trim().is_empty() {
            self.results.clear();
            self.section = PaletteSection::Actions;
            self.selected = 0;
            self.searching = false;
            return PaletteOutcome::ClearResults;
        }
        self.searching = true;
        PaletteOutcome::Search {
            query: self.query.trim().to_string(),
            generation: self.generation,
        }
    }

    /// Accept search results. Returns false when they belong to an older query.
    pub fn set_results(&mut self, generation: u64, results: Vec<FeedItem>) -> bool {
        if !self.open || generation != self.generation {
            return false;
        }
        self.searching = false;
        self.results = results;
        self.section = PaletteSection::Results;
        self.selected = 0;
        true
    }

    pub fn search_failed(&mut self, generation: u64, message: &str) {
        if generation != self.generation {
            return;
        }
        tracing::warn!("Quick search failed: {}", message);
        self.searching = false;
        self.results.clear();
        self.section = PaletteSection::Actions;
        self.selected = 0;
    }

    fn section_len(&self) -> usize {
        match self.section {
            PaletteSection::Actions => QUICK_ACTIONS.len(),
            PaletteSection::Results => self.results.len(),
        }
    }

    pub fn move_down(&mut self) {
        let max = self.section_len().saturating_sub(1);
        self.selected = (self.selected + 1).min(max);
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn switch_section(&mut self) {
        if self.results.is_empty() {
            return;
        }
        self.section = match self.section {
            PaletteSection::Actions => PaletteSection::Results,
            PaletteSection::Results => PaletteSection::Actions,
        };
        self.selected = 0;
    }

    /// Run the selected entry and close.
    pub fn activate(&mut self) -> PaletteOutcome {
        let outcome = match self.section {
            PaletteSection::Actions => QUICK_ACTIONS
                .get(self.selected)
                .map(|action| PaletteOutcome::Navigate(action.view)),
            PaletteSection::Results => self
                .results
                .get(self.selected)
                .map(|item| PaletteOutcome::OpenItem(Box::new(item.clone()))),
        };
        match outcome {
            Some(outcome) => {
                self.close();
                outcome
            }
            None => PaletteOutcome::None,
        }
    }
}
