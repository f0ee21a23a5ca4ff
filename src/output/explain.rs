//! Tree rendering of `EXPLAIN QUERY PLAN` output.

use std::io::Write;

use super::Printer;
use crate::engine::ResultSet;
use crate::errors::Error;
use crate::format::{FormatMode, format_row};

/// Column names of an `EXPLAIN QUERY PLAN` result set, in order.
const QUERY_PLAN_COLUMNS: [&str; 4] = ["id", "parent", "notused", "detail"];

/// Whether `columns` are exactly those of `EXPLAIN QUERY PLAN` output.
pub(super) fn is_query_plan(columns: &[String]) -> bool {
    columns.iter().map(String::as_str).eq(QUERY_PLAN_COLUMNS)
}

struct Node {
    id: String,
    detail: String,
    children: Vec<usize>,
}

/// Draws a query plan as an indented tree under a `QUERY PLAN` title.
///
/// ```text
/// QUERY PLAN
/// |--SCAN t
/// `--USE TEMP B-TREE FOR ORDER BY
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryPlanPrinter;

impl Printer for QueryPlanPrinter {
    fn print(&mut self, result_set: ResultSet, out: &mut dyn Write) -> Result<(), Error> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut roots = Vec::new();
        for row in result_set.rows {
            let mut cells = format_row(&row?, FormatMode::Table).into_iter();
            let id = cells.next().unwrap_or_default();
            let parent = cells.next().unwrap_or_default();
            let detail = cells.nth(1).unwrap_or_default();

            // Parents always precede their children; anything else hangs off the root.
            let index = nodes.len();
            match nodes.iter().rposition(|node| node.id == parent) {
                Some(parent) => nodes[parent].children.push(index),
                None => roots.push(index),
            }
            nodes.push(Node {
                id,
                detail,
                children: Vec::new(),
            });
        }

        writeln!(out, "QUERY PLAN")?;
        draw(&nodes, &roots, "", out)
    }
}

fn draw(nodes: &[Node], level: &[usize], prefix: &str, out: &mut dyn Write) -> Result<(), Error> {
    for (position, &index) in level.iter().enumerate() {
        let last = position + 1 == level.len();
        let node = &nodes[index];
        writeln!(out, "{prefix}{}{}", if last { "`--" } else { "|--" }, node.detail)?;
        let nested = format!("{prefix}{}", if last { "   " } else { "|  " });
        draw(nodes, &node.children, &nested, out)?;
    }
    Ok(())
}
