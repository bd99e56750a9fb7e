use std::collections::HashSet;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::RomsiftError;
use crate::filter::FilterState;
use crate::models::{GridColumn, SearchField, SortDirection};
use crate::profiles::ProfileStore;

/// One renderable grid row: the checkbox flag plus display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub selected: bool,
    pub name: String,
    pub description: String,
    pub developer: String,
    pub series: String,
    pub category: String,
    pub genre: String,
    pub rank: String,
}

/// Outcome of a grid transition, for the presentation layer to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridOutcome {
    /// The grid was rebuilt; `total` matches found.
    Rebuilt { total: u32 },
    /// Nothing matched; the rendered grid was cleared.
    NoMatches,
    /// The transition did not apply (e.g. `next()` on the last page).
    Noop,
}

/// The live result grid: current filter, sort, page window, and the
/// pre-fetched selection set for the active profile.
///
/// Every rebuild re-reads the profile's full selection set once, so
/// checkbox state survives pagination and re-sorting.
pub struct GridModel {
    profile: String,
    pub filter: FilterState,
    sort_column: GridColumn,
    sort_direction: SortDirection,
    page_size: u32,
    cur_page: u32,
    last_page: u32,
    total: u32,
    rows: Vec<GridRow>,
    selected: HashSet<String>,
    /// Alternation state for the checkbox-header click: `true` means
    /// the next invocation selects the page, `false` deselects it.
    bulk_select_next: bool,
}

impl GridModel {
    /// Fresh model for the given active profile at default settings
    /// (Description ascending, page size from config, screenless hidden).
    pub fn new(profile: &str, page_size: u32) -> Self {
        Self {
            profile: profile.to_string(),
            filter: FilterState::default(),
            sort_column: GridColumn::Description,
            sort_direction: SortDirection::Ascending,
            page_size,
            cur_page: 0,
            last_page: 0,
            total: 0,
            rows: Vec::new(),
            selected: HashSet::new(),
            bulk_select_next: true,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn cur_page(&self) -> u32 {
        self.cur_page
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> (GridColumn, SortDirection) {
        (self.sort_column, self.sort_direction)
    }

    /// The profile selector changed: adopt the new profile, reset all
    /// exclusions and the search term, and rebuild at defaults.
    pub fn reset_for_profile(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
        profile: &str,
    ) -> Result<GridOutcome, RomsiftError> {
        self.profile = profile.to_string();
        self.filter = FilterState::default();
        self.sort_column = GridColumn::Description;
        self.sort_direction = SortDirection::Ascending;
        self.rebuild(catalog, store, 1)
    }

    /// Apply a new search and rebuild from page 1.
    pub fn search(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
        field: SearchField,
        term: &str,
    ) -> Result<GridOutcome, RomsiftError> {
        self.filter.field = field;
        self.filter.term = term.to_string();
        self.rebuild(catalog, store, 1)
    }

    /// Drop the search term and exclusions back to defaults, keeping
    /// the active profile, then rebuild from page 1.
    pub fn reset_search(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
    ) -> Result<GridOutcome, RomsiftError> {
        self.filter = FilterState::default();
        self.rebuild(catalog, store, 1)
    }

    /// Advance one page; silently ignored on the last page.
    pub fn next(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
    ) -> Result<GridOutcome, RomsiftError> {
        if self.cur_page < self.last_page {
            self.rebuild(catalog, store, self.cur_page + 1)
        } else {
            Ok(GridOutcome::Noop)
        }
    }

    /// Back one page; silently ignored on page 1.
    pub fn prev(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
    ) -> Result<GridOutcome, RomsiftError> {
        if self.cur_page > 1 {
            self.rebuild(catalog, store, self.cur_page - 1)
        } else {
            Ok(GridOutcome::Noop)
        }
    }

    /// Switch the results-per-page size and rebuild from page 1.
    pub fn change_page_size(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
        page_size: u32,
    ) -> Result<GridOutcome, RomsiftError> {
        self.page_size = page_size;
        self.rebuild(catalog, store, 1)
    }

    /// Flip one row's selection via the store, updating only that
    /// row's rendered flag. Returns the new state, or `Noop` if the
    /// game is not on the current page.
    pub fn toggle_row(
        &mut self,
        store: &ProfileStore,
        name: &str,
    ) -> Result<GridOutcome, RomsiftError> {
        let Some(row) = self.rows.iter_mut().find(|r| r.name == name) else {
            return Ok(GridOutcome::Noop);
        };
        if row.selected {
            store.remove(&self.profile, name)?;
            self.selected.remove(name);
            row.selected = false;
        } else {
            store.add(&self.profile, name)?;
            self.selected.insert(name.to_string());
            row.selected = true;
        }
        Ok(GridOutcome::Rebuilt { total: self.total })
    }

    /// Header click. The synthetic checkbox column selects or
    /// deselects the whole page; any other column re-sorts: same
    /// column flips direction, a new column starts ascending. Sorting
    /// rebuilds from page 1.
    pub fn toggle_column_sort(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
        column: GridColumn,
    ) -> Result<GridOutcome, RomsiftError> {
        if column == GridColumn::Selected {
            return self.select_all_or_none(store);
        }
        if column == self.sort_column {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_column = column;
            self.sort_direction = SortDirection::Ascending;
        }
        self.rebuild(catalog, store, 1)
    }

    /// Alternately select or deselect every row on the current page
    /// (the current page only — never the whole match set). Applied as
    /// one bulk store operation, then the checkbox column is updated
    /// in place without a rebuild.
    pub fn select_all_or_none(
        &mut self,
        store: &ProfileStore,
    ) -> Result<GridOutcome, RomsiftError> {
        if self.rows.is_empty() {
            return Ok(GridOutcome::Noop);
        }
        let names: Vec<String> = self.rows.iter().map(|r| r.name.clone()).collect();
        if self.bulk_select_next {
            store.bulk_add(&self.profile, &names)?;
            for row in &mut self.rows {
                row.selected = true;
            }
            self.selected.extend(names);
        } else {
            store.bulk_remove(&self.profile, &names)?;
            for row in &mut self.rows {
                row.selected = false;
            }
            for name in &names {
                self.selected.remove(name);
            }
        }
        self.bulk_select_next = !self.bulk_select_next;
        info!(profile = %self.profile, select = !self.bulk_select_next, "page-wide selection toggled");
        Ok(GridOutcome::Rebuilt { total: self.total })
    }

    /// Re-run the query at the given page and merge in selection
    /// membership. On store errors the rendered rows are cleared — a
    /// failed rebuild leaves nothing stale behind.
    fn rebuild(
        &mut self,
        catalog: &Catalog,
        store: &ProfileStore,
        page: u32,
    ) -> Result<GridOutcome, RomsiftError> {
        self.rows.clear();
        self.bulk_select_next = true;

        self.selected = store.list_selected(&self.profile)?;
        let page_result = catalog.fetch_page(
            &self.filter,
            self.sort_column,
            self.sort_direction,
            page,
            self.page_size,
        )?;

        let Some(qp) = page_result else {
            self.cur_page = 0;
            self.last_page = 0;
            self.total = 0;
            debug!(profile = %self.profile, "no games in the result");
            return Ok(GridOutcome::NoMatches);
        };

        self.cur_page = qp.cur_page;
        self.last_page = qp.last_page;
        self.total = qp.total;
        self.rows = qp
            .rows
            .into_iter()
            .map(|g| GridRow {
                selected: self.selected.contains(&g.name),
                name: g.name,
                description: g.description,
                developer: g.developer,
                series: g.series,
                category: g.category,
                genre: g.genre,
                rank: g.rank,
            })
            .collect();

        debug!(
            profile = %self.profile,
            total = self.total,
            page = self.cur_page,
            of = self.last_page,
            "grid rebuilt"
        );
        Ok(GridOutcome::Rebuilt { total: self.total })
    }
}
