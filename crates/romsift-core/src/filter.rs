use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{SearchField, BLANK_LABEL};

/// The active search/filter selections, as shown in the search bar and
/// the rank/genre menus.
///
/// The exclusion sets hold menu labels, i.e. "all known values minus
/// the checked ones". The `Blank` label stands for the empty-string
/// value and is translated back when the clause is emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterState {
    pub term: String,
    pub field: SearchField,
    pub excluded_ranks: BTreeSet<String>,
    pub excluded_genres: BTreeSet<String>,
    /// Screenless games are hidden unless this is set.
    pub include_screenless: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            term: String::new(),
            field: SearchField::Description,
            excluded_ranks: BTreeSet::new(),
            excluded_genres: BTreeSet::new(),
            include_screenless: false,
        }
    }
}

impl FilterState {
    /// Build the WHERE fragment plus bound parameters.
    ///
    /// Only the free-text term binds a parameter (prefix match,
    /// `term%`). Rank and genre membership is embedded as literals:
    /// the domains are closed sets read from the catalog at startup.
    /// Fully-included sets emit no clause at all.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        let term = self.term.trim();
        if !term.is_empty() {
            clauses.push(format!("games.{} LIKE ?", self.field.as_column()));
            params.push(format!("{term}%"));
        }

        if !self.include_screenless {
            clauses.push("games.Screenless=0".to_string());
        }

        if let Some(list) = quoted_list(&self.excluded_ranks) {
            clauses.push(format!("games.Rank NOT IN ({list})"));
        }

        if let Some(list) = quoted_list(&self.excluded_genres) {
            clauses.push(format!("games.Genre NOT IN ({list})"));
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }

    /// True when no clause would be emitted.
    pub fn is_empty(&self) -> bool {
        self.term.trim().is_empty()
            && self.include_screenless
            && self.excluded_ranks.is_empty()
            && self.excluded_genres.is_empty()
    }
}

/// Quote a label set as a comma-separated SQL literal list, or `None`
/// when the set is empty. The `Blank` label maps to the literal empty
/// string.
fn quoted_list(labels: &BTreeSet<String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }
    let quoted: Vec<String> = labels
        .iter()
        .map(|l| {
            let raw = if l == BLANK_LABEL { "" } else { l.as_str() };
            format!("'{}'", raw.replace('\'', "''"))
        })
        .collect();
    Some(quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_included() -> FilterState {
        FilterState {
            include_screenless: true,
            ..FilterState::default()
        }
    }

    #[test]
    fn fully_included_filter_emits_no_predicate() {
        let (where_sql, params) = all_included().to_sql();
        assert_eq!(where_sql, "");
        assert!(params.is_empty());
        assert!(all_included().is_empty());
    }

    #[test]
    fn default_filter_hides_screenless() {
        let (where_sql, params) = FilterState::default().to_sql();
        assert_eq!(where_sql, " WHERE games.Screenless=0");
        assert!(params.is_empty());
    }

    #[test]
    fn term_binds_prefix_parameter() {
        let mut f = all_included();
        f.term = "  street fighter  ".to_string();
        f.field = SearchField::Name;
        let (where_sql, params) = f.to_sql();
        assert_eq!(where_sql, " WHERE games.Name LIKE ?");
        assert_eq!(params, vec!["street fighter%".to_string()]);
    }

    #[test]
    fn rank_exclusion_embeds_literals() {
        // "A" unchecked while "B" and "C" remain checked.
        let mut f = all_included();
        f.excluded_ranks.insert("A".to_string());
        let (where_sql, params) = f.to_sql();
        assert_eq!(where_sql, " WHERE games.Rank NOT IN ('A')");
        assert!(params.is_empty());
    }

    #[test]
    fn blank_label_matches_empty_value() {
        let mut f = all_included();
        f.excluded_genres.insert(BLANK_LABEL.to_string());
        f.excluded_genres.insert("Puzzle".to_string());
        let (where_sql, _) = f.to_sql();
        assert_eq!(where_sql, " WHERE games.Genre NOT IN ('','Puzzle')");
    }

    #[test]
    fn clauses_join_with_and_in_emission_order() {
        let mut f = FilterState::default();
        f.term = "cap".to_string();
        f.excluded_ranks.insert("D".to_string());
        f.excluded_genres.insert("Mahjong".to_string());
        let (where_sql, params) = f.to_sql();
        assert_eq!(
            where_sql,
            " WHERE games.Description LIKE ? AND games.Screenless=0 \
             AND games.Rank NOT IN ('D') AND games.Genre NOT IN ('Mahjong')"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn genre_only_exclusion_is_well_formed() {
        // Regression shape: a lone genre exclusion must still start
        // with WHERE, not a dangling AND.
        let mut f = all_included();
        f.excluded_genres.insert("Casino".to_string());
        let (where_sql, _) = f.to_sql();
        assert!(where_sql.starts_with(" WHERE games.Genre"));
    }
}
