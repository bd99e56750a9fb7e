use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::debug;

use crate::error::RomsiftError;
use crate::filter::FilterState;
use crate::models::{display_value, AcquisitionItem, Game, GridColumn, SortDirection};

/// One page of catalog query results.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub rows: Vec<Game>,
    pub total: u32,
    pub cur_page: u32,
    /// `max(1, total / page_size)` — floor division, so a 101-row
    /// result at page size 100 reports one page. Kept as-is; the
    /// pagination transitions key off this value.
    pub last_page: u32,
    pub page_size: u32,
}

/// Read-only store over the pre-built game catalog.
///
/// The connection is opened once and lives for the process; each query
/// is a short-lived prepared statement.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open the catalog database read-only.
    pub fn open(path: &Path) -> Result<Self, RomsiftError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog with the games schema (for tests).
    pub fn open_memory() -> Result<Self, RomsiftError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE games (
                Name TEXT PRIMARY KEY NOT NULL,
                Genre TEXT NOT NULL DEFAULT '',
                Cat TEXT NOT NULL DEFAULT '',
                Developer TEXT NOT NULL DEFAULT '',
                Publisher TEXT NOT NULL DEFAULT '',
                Year INTEGER,
                Series TEXT NOT NULL DEFAULT '',
                Description TEXT NOT NULL DEFAULT '',
                ROMof TEXT NOT NULL DEFAULT '',
                Disk TEXT NOT NULL DEFAULT '',
                Rank TEXT NOT NULL DEFAULT '',
                Screenless INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(Self { conn })
    }

    /// Insert games into an in-memory catalog (test support; the real
    /// catalog ships pre-built and is never written).
    pub fn seed(&self, games: &[Game]) -> Result<(), RomsiftError> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO games (Name, Genre, Cat, Developer, Series, Description, Disk, Rank, Screenless)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for g in games {
            stmt.execute(rusqlite::params![
                g.name,
                g.genre,
                g.category,
                g.developer,
                g.series,
                g.description,
                g.disk.as_deref().unwrap_or(""),
                g.rank,
                g.screenless as i32,
            ])?;
        }
        Ok(())
    }

    /// Distinct rank labels, ordered, with the empty value surfaced as
    /// `Blank`. Read once at startup to build the rank menu.
    pub fn ranks(&self) -> Result<Vec<String>, RomsiftError> {
        self.distinct_labels("SELECT rank FROM games GROUP BY rank ORDER BY rank")
    }

    /// Distinct genre labels, same convention as [`ranks`](Self::ranks).
    pub fn genres(&self) -> Result<Vec<String>, RomsiftError> {
        self.distinct_labels("SELECT genre FROM games GROUP BY genre ORDER BY genre")
    }

    fn distinct_labels(&self, sql: &str) -> Result<Vec<String>, RomsiftError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| {
                let v: String = row.get(0)?;
                Ok(display_value(&v).to_string())
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Fetch one page of the filtered catalog.
    ///
    /// A single CTE query computes the total match count and the
    /// sorted/offset window together. Returns `None` when nothing
    /// matches; the caller clears any previously rendered content.
    /// The checkbox column is synthetic, so it falls back to the
    /// default sort (Description). Page and page size are clamped to
    /// at least 1.
    pub fn fetch_page(
        &self,
        filter: &FilterState,
        sort_column: GridColumn,
        sort_direction: SortDirection,
        page: u32,
        page_size: u32,
    ) -> Result<Option<QueryPage>, RomsiftError> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let (where_sql, text_params) = filter.to_sql();
        let order_by = sort_column.sort_column().unwrap_or("Description");
        let offset = page_size * (page - 1);

        let sql = format!(
            "WITH all_games AS (SELECT * FROM games{where_sql}),
                  count_games AS (SELECT COUNT(*) AS total FROM all_games)
             SELECT c.total, g.Name, g.Genre, g.Cat, g.Developer, g.Series,
                    g.Description, g.Disk, g.Rank, g.Screenless
             FROM all_games g CROSS JOIN count_games c
             ORDER BY g.{order_by} {} LIMIT {page_size} OFFSET {offset}",
            sort_direction.as_sql(),
        );
        debug!(page, page_size, %order_by, "catalog page query");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut total: u32 = 0;
        let rows: Vec<Game> = stmt
            .query_map(params_from_iter(text_params.iter()), |row| {
                total = row.get(0)?;
                let disk: String = row.get(7)?;
                Ok(Game {
                    name: row.get(1)?,
                    genre: row.get(2)?,
                    category: row.get(3)?,
                    developer: row.get(4)?,
                    series: row.get(5)?,
                    description: row.get(6)?,
                    disk: if disk.is_empty() { None } else { Some(disk) },
                    rank: row.get(8)?,
                    screenless: row.get::<_, i32>(9)? != 0,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        if rows.is_empty() {
            // Zero matches. (An empty window past the last page looks
            // the same, but the page transitions never request one.)
            return Ok(None);
        }

        let last_page = if total >= page_size {
            total / page_size
        } else {
            1
        };

        Ok(Some(QueryPage {
            rows,
            total,
            cur_page: page,
            last_page,
            page_size,
        }))
    }

    /// Resolve selected game names into acquisition items, picking up
    /// each game's companion disk. Names not present in the catalog are
    /// silently dropped; an empty selection resolves to an empty plan.
    pub fn resolve_selection(
        &self,
        names: &HashSet<String>,
    ) -> Result<Vec<AcquisitionItem>, RomsiftError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let qmarks = vec!["?"; names.len()].join(",");
        let sql = format!(
            "SELECT Name, Disk FROM games WHERE Name IN ({qmarks}) ORDER BY Name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(names.iter()), |row| {
                let name: String = row.get(0)?;
                let disk: String = row.get(1)?;
                Ok(AcquisitionItem {
                    name,
                    disk: if disk.is_empty() { None } else { Some(disk) },
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }
}
