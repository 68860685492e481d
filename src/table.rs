use crate::config::{ConfigError, Settings, Zone};
use crate::timestamp::{self, Outcome, Skip};
use chrono::{Local, Utc};
use ego_tree::NodeId;
use scraper::node::Text;
use scraper::{Html, Node, Selector, StrTendril};
use serde::Serialize;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    /// 1-based position among the selected rows.
    pub row: usize,
    /// Untrimmed text of the target cell, `None` when the row has no such cell.
    pub raw: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub reformatted: usize,
    pub missing_cell: usize,
    pub no_match: usize,
    pub invalid_date: usize,
}

impl Summary {
    pub fn from_reports(reports: &[RowReport]) -> Self {
        let mut summary = Summary {
            rows: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match report.outcome.skip() {
                None => summary.reformatted += 1,
                Some(Skip::MissingCell) => summary.missing_cell += 1,
                Some(Skip::NoMatch) => summary.no_match += 1,
                Some(Skip::InvalidDate) => summary.invalid_date += 1,
            }
        }
        summary
    }

    pub fn unchanged(&self) -> usize {
        self.missing_cell + self.no_match + self.invalid_date
    }
}

/// Target cell of one row, captured before any mutation.
struct Target {
    cell: Option<(NodeId, String)>,
}

/// Finds the timestamp column of every data row and rewrites it in place.
pub struct Reformatter {
    rows: Selector,
    cells: Selector,
    column: usize,
    zone: Zone,
}

impl Reformatter {
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            rows: compile(&settings.row_selector)?,
            cells: compile(&settings.cell_selector)?,
            column: settings.column,
            zone: settings.zone,
        })
    }

    /// Reformats a single cell text in the configured zone.
    pub fn reformat(&self, raw: &str) -> Outcome {
        reformat_in(self.zone, raw)
    }

    /// Runs one pass over `doc`. Rows are snapshotted first, so only cells
    /// present when the pass starts are considered. Returns one report per
    /// selected row, in document order.
    pub fn apply(&self, doc: &mut Html) -> Vec<RowReport> {
        let targets = self.snapshot(doc);
        let outcomes = self.outcomes(&targets);

        let mut reports = Vec::with_capacity(targets.len());
        for (i, (target, outcome)) in targets.into_iter().zip(outcomes).enumerate() {
            let row = i + 1;
            let raw = match (target.cell, &outcome) {
                (Some((id, raw)), Outcome::Reformatted { text }) => {
                    set_text(doc, id, text);
                    Some(raw)
                }
                (Some((_, raw)), Outcome::Unchanged { reason }) => {
                    debug!(row, reason = reason.as_str(), raw = raw.as_str(), "left cell unchanged");
                    Some(raw)
                }
                (None, _) => {
                    debug!(row, column = self.column, "row has no target cell");
                    None
                }
            };
            reports.push(RowReport { row, raw, outcome });
        }
        reports
    }

    fn snapshot(&self, doc: &Html) -> Vec<Target> {
        doc.select(&self.rows)
            .map(|row| Target {
                cell: row
                    .select(&self.cells)
                    .nth(self.column)
                    .map(|cell| (cell.id(), cell.text().collect::<String>())),
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn outcomes(&self, targets: &[Target]) -> Vec<Outcome> {
        let zone = self.zone;
        targets.iter().map(|t| outcome_for(zone, t)).collect()
    }

    #[cfg(feature = "parallel")]
    fn outcomes(&self, targets: &[Target]) -> Vec<Outcome> {
        let zone = self.zone;
        targets.par_iter().map(|t| outcome_for(zone, t)).collect()
    }
}

fn outcome_for(zone: Zone, target: &Target) -> Outcome {
    match &target.cell {
        Some((_, raw)) => reformat_in(zone, raw),
        None => Outcome::Unchanged {
            reason: Skip::MissingCell,
        },
    }
}

fn reformat_in(zone: Zone, raw: &str) -> Outcome {
    match zone {
        Zone::Local => timestamp::reformat(raw, &Local),
        Zone::Utc => timestamp::reformat(raw, &Utc),
        Zone::Fixed(_) => match zone.fixed_offset() {
            Some(offset) => timestamp::reformat(raw, &offset),
            None => timestamp::reformat(raw, &Utc),
        },
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Replaces every child of `id` with a single text node, like assigning
/// `textContent`.
fn set_text(doc: &mut Html, id: NodeId, text: &str) {
    let Some(mut cell) = doc.tree.get_mut(id) else {
        return;
    };
    while let Some(mut child) = cell.first_child() {
        child.detach();
    }
    cell.append(Node::Text(Text {
        text: StrTendril::from(text),
    }));
}
