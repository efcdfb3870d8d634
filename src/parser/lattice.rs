//! Table detection from ruling lines (lattice method).
//!
//! Slower than the stream method but exact for bordered tables: stroked
//! lines are grouped into grids, grid lines become cell boundaries and
//! text spans are dropped into the cell containing their center.

use crate::model::{BoundingBox, TableMethod};
use crate::parser::Thresholds;

use super::content::Ruling;
use super::layout::TextSpan;
use super::table_detector::{table_confidence, TableCandidate};

/// Lattice detector configuration.
#[derive(Debug, Clone)]
pub struct LatticeConfig {
    /// Rulings shorter than this are ignored (points)
    pub min_line_length: f32,
    /// Lines within this distance are the same grid line (points)
    pub snap_tolerance: f32,
    /// Rulings closer than this are considered connected (points)
    pub join_tolerance: f32,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            min_line_length: 10.0,
            snap_tolerance: 2.0,
            join_tolerance: 3.0,
        }
    }
}

impl From<&Thresholds> for LatticeConfig {
    fn from(thresholds: &Thresholds) -> Self {
        Self {
            min_line_length: thresholds.table_min_ruling_length,
            snap_tolerance: thresholds.table_snap_tolerance,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct LatticeDetector {
    config: LatticeConfig,
}

impl LatticeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LatticeConfig) -> Self {
        Self { config }
    }

    /// Detect ruled tables on a page.
    pub fn detect(&self, spans: &[TextSpan], rulings: &[Ruling]) -> Vec<TableCandidate> {
        let lines: Vec<Ruling> = rulings
            .iter()
            .filter(|r| {
                (r.is_horizontal() || r.is_vertical()) && r.length() >= self.config.min_line_length
            })
            .copied()
            .collect();

        self.connected_groups(&lines)
            .into_iter()
            .filter_map(|group| self.build_grid(spans, &group))
            .collect()
    }

    /// Split rulings into groups of lines that touch each other.
    fn connected_groups(&self, lines: &[Ruling]) -> Vec<Vec<Ruling>> {
        let tol = self.config.join_tolerance;
        let mut group_of: Vec<Option<usize>> = vec![None; lines.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for start in 0..lines.len() {
            if group_of[start].is_some() {
                continue;
            }
            let id = groups.len();
            group_of[start] = Some(id);
            let mut members = vec![start];
            let mut cursor = 0;
            while cursor < members.len() {
                let current = lines[members[cursor]];
                for (j, other) in lines.iter().enumerate() {
                    if group_of[j].is_none() && touches(&current, other, tol) {
                        group_of[j] = Some(id);
                        members.push(j);
                    }
                }
                cursor += 1;
            }
            groups.push(members);
        }

        groups
            .into_iter()
            .map(|members| members.into_iter().map(|i| lines[i]).collect())
            .collect()
    }

    fn build_grid(&self, spans: &[TextSpan], group: &[Ruling]) -> Option<TableCandidate> {
        let tol = self.config.snap_tolerance;

        let mut ys = snap(group.iter().filter(|r| r.is_horizontal()).map(|r| r.y0), tol);
        let xs = snap(group.iter().filter(|r| r.is_vertical()).map(|r| r.x0), tol);
        if ys.len() < 2 || xs.len() < 2 {
            return None;
        }
        // Rows read top to bottom.
        ys.reverse();

        let (left, right) = (xs[0], xs[xs.len() - 1]);
        let (top, bottom) = (ys[0], ys[ys.len() - 1]);
        let mut rows = vec![vec![String::new(); xs.len() - 1]; ys.len() - 1];
        let mut used = Vec::new();

        for (idx, span) in spans.iter().enumerate() {
            let cx = span.x + span.width / 2.0;
            let cy = span.y + span.font_size * 0.3;
            if cx < left || cx > right || cy > top || cy < bottom {
                continue;
            }
            let Some(col) = xs.windows(2).position(|w| cx >= w[0] && cx <= w[1]) else {
                continue;
            };
            let Some(row) = ys.windows(2).position(|w| cy <= w[0] && cy >= w[1]) else {
                continue;
            };
            let cell = &mut rows[row][col];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(span.text.trim());
            used.push(idx);
        }

        if used.is_empty() {
            log::debug!("lattice: grid without text ignored");
            return None;
        }

        let coverage = grid_coverage(group, &xs, &ys, tol);
        Some(TableCandidate {
            confidence: table_confidence(&rows, coverage),
            rows,
            bbox: BoundingBox::new(left, bottom, right - left, top - bottom),
            method: TableMethod::Lattice,
            spans: used,
        })
    }
}

/// Share of grid lines that are drawn across (nearly) the full grid extent.
fn grid_coverage(group: &[Ruling], xs: &[f32], ys: &[f32], tol: f32) -> f32 {
    let width = xs[xs.len() - 1] - xs[0];
    let height = ys[0] - ys[ys.len() - 1];

    let full_rows = ys
        .iter()
        .filter(|&&y| {
            group
                .iter()
                .filter(|r| r.is_horizontal() && (r.y0 - y).abs() <= tol)
                .map(|r| (r.x1 - r.x0).abs())
                .sum::<f32>()
                >= width * 0.9
        })
        .count();
    let full_cols = xs
        .iter()
        .filter(|&&x| {
            group
                .iter()
                .filter(|r| r.is_vertical() && (r.x0 - x).abs() <= tol)
                .map(|r| (r.y1 - r.y0).abs())
                .sum::<f32>()
                >= height * 0.9
        })
        .count();

    (full_rows + full_cols) as f32 / (xs.len() + ys.len()) as f32
}

/// Sorted distinct positions, merging values within `tol`.
fn snap(values: impl Iterator<Item = f32>, tol: f32) -> Vec<f32> {
    let mut values: Vec<f32> = values.collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut out: Vec<f32> = Vec::new();
    for v in values {
        match out.last() {
            Some(&last) if v - last <= tol => {}
            _ => out.push(v),
        }
    }
    out
}

fn touches(a: &Ruling, b: &Ruling, tol: f32) -> bool {
    let (ax0, ax1) = (a.x0.min(a.x1) - tol, a.x0.max(a.x1) + tol);
    let (ay0, ay1) = (a.y0.min(a.y1) - tol, a.y0.max(a.y1) + tol);
    let (bx0, bx1) = (b.x0.min(b.x1), b.x0.max(b.x1));
    let (by0, by1) = (b.y0.min(b.y1), b.y0.max(b.y1));
    ax0 <= bx1 && bx0 <= ax1 && ay0 <= by1 && by0 <= ay1
}
