use crate::event::{Columns, Value};

/// Rows produced from one column map. See [`expand`].
#[derive(Clone, Debug)]
pub struct Expand<'a> {
    columns: &'a Columns,
    /// Length of the shortest list, or `None` when every field is scalar.
    rows: Option<usize>,
    next: usize,
}

/// Flattens list-valued fields into one map per index.
///
/// Scalar fields are copied onto every row. Lists are treated as parallel
/// arrays and iteration stops with the shortest one, so unequal lengths drop
/// the unmatched tail and an empty list yields no rows at all. A map without
/// lists is yielded once, unchanged.
pub fn expand(columns: &Columns) -> Expand<'_> {
    let rows = columns
        .iter()
        .filter_map(|(_, value)| match value {
            Value::List(list) => Some(list.len()),
            _ => None,
        })
        .min();
    Expand {
        columns,
        rows,
        next: 0,
    }
}

impl Iterator for Expand<'_> {
    type Item = Columns;

    fn next(&mut self) -> Option<Columns> {
        let index = self.next;
        match self.rows {
            None if index == 0 => {}
            Some(rows) if index < rows => {}
            _ => return None,
        }
        self.next += 1;

        Some(
            self.columns
                .iter()
                .map(|(name, value)| match value {
                    Value::List(list) => (name, list[index].clone()),
                    scalar => (name, scalar.clone()),
                })
                .collect(),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = self.rows.unwrap_or(1);
        let left = total.saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Expand<'_> {}
