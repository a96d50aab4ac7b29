use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_SHOW_MORE_INCREMENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Student {
    /// Name shown on screen and on marksheets: the name, else the admission
    /// number, else the id.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if !name.is_empty() {
            return name;
        }
        match self.admission_number.as_deref().map(str::trim) {
            Some(adm) if !adm.is_empty() => adm,
            _ => self.id.as_str(),
        }
    }
}

pub fn matches_search(student: &Student, needle_lower: &str) -> bool {
    needle_lower.is_empty() || student.display_name().to_lowercase().contains(needle_lower)
}

/// First `page_window` students whose display name contains `term`, roster order kept.
pub fn view<'a>(roster: &'a [Student], term: &str, page_window: usize) -> Vec<&'a Student> {
    let needle = term.trim().to_lowercase();
    roster
        .iter()
        .filter(|s| matches_search(s, &needle))
        .take(page_window)
        .collect()
}

pub fn match_count(roster: &[Student], term: &str) -> usize {
    let needle = term.trim().to_lowercase();
    roster.iter().filter(|s| matches_search(s, &needle)).count()
}

/// Search term plus page window for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub search_term: String,
    pub page_window: usize,
    #[serde(skip)]
    page_size: usize,
    #[serde(skip)]
    increment: usize,
}

impl ViewState {
    pub fn new(page_size: usize, increment: usize) -> Self {
        Self {
            search_term: String::new(),
            page_window: page_size,
            page_size,
            increment,
        }
    }

    /// Returns true when the term changed and the window was reset.
    pub fn set_search(&mut self, term: &str) -> bool {
        if self.search_term == term {
            return false;
        }
        self.search_term = term.to_string();
        self.page_window = self.page_size;
        true
    }

    pub fn show_more(&mut self) {
        self.page_window = self.page_window.saturating_add(self.increment);
    }

    pub fn apply<'a>(&self, roster: &'a [Student]) -> Vec<&'a Student> {
        view(roster, &self.search_term, self.page_window)
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_SHOW_MORE_INCREMENT)
    }
}
