//! Compressed-sparse-row container for batched search results, mirroring
//! `SearchResults` in `examples/original_source/chemfp/arena.py`: one row
//! per query, each row a variable-length list of `(target_index, score)`
//! pairs, with the six row-reorder strategies from
//! `examples/original_source/chemfp/fps_search.py`'s `_reorder_row`.
//!
//! Every hit carries an id, not just a numeric index: `target_ids` and
//! `query_ids` are resolved once at construction (from an arena's ids, or
//! from a streaming search's own parsed ids) so a caller never needs to
//! hold on to the original arena or file to make sense of a result set.

/// How to order the hits within each row of a [`SearchResults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    DecreasingScore,
    IncreasingScore,
    DecreasingId,
    IncreasingId,
    Reverse,
    /// Move the single closest hit to the front; leave the rest as-is.
    MoveClosestFirst,
}

/// Batched search results in compressed-sparse-row form: `offsets` has
/// `num_queries + 1` entries, and row `i`'s hits live in
/// `indices[offsets[i]..offsets[i+1]]` / `scores[offsets[i]..offsets[i+1]]`.
/// `target_ids[indices[j]]` and `query_ids[i]` give the ids for a hit.
#[derive(Debug, Clone)]
pub struct SearchResults {
    offsets: Vec<u32>,
    indices: Vec<u32>,
    scores: Vec<f64>,
    target_ids: Vec<String>,
    query_ids: Vec<String>,
}

impl SearchResults {
    /// Build from per-query hit lists (`target_index`, score), the full
    /// id table the indices are drawn from, and one id per query row.
    pub fn from_rows(rows: Vec<Vec<(u32, f64)>>, target_ids: Vec<String>, query_ids: Vec<String>) -> SearchResults {
        assert_eq!(rows.len(), query_ids.len(), "one query id is required per row");
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut scores = Vec::new();
        offsets.push(0);
        for row in rows {
            for (index, score) in row {
                indices.push(index);
                scores.push(score);
            }
            offsets.push(indices.len() as u32);
        }
        SearchResults {
            offsets,
            indices,
            scores,
            target_ids,
            query_ids,
        }
    }

    pub fn num_queries(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn size(&self, query: usize) -> usize {
        (self.offsets[query + 1] - self.offsets[query]) as usize
    }

    pub fn total_hits(&self) -> usize {
        self.indices.len()
    }

    pub fn query_id(&self, query: usize) -> &str {
        &self.query_ids[query]
    }

    pub fn target_id(&self, target_index: u32) -> &str {
        &self.target_ids[target_index as usize]
    }

    fn row_range(&self, query: usize) -> (usize, usize) {
        (self.offsets[query] as usize, self.offsets[query + 1] as usize)
    }

    /// The `(id, score)` pairs for one query row, in whatever order they
    /// were built or last reordered in.
    pub fn row(&self, query: usize) -> impl Iterator<Item = (&str, f64)> + '_ {
        let (start, end) = self.row_range(query);
        self.indices[start..end]
            .iter()
            .zip(&self.scores[start..end])
            .map(move |(&i, &s)| (self.target_ids[i as usize].as_str(), s))
    }

    /// Like [`SearchResults::row`], but keeps the raw `target_index`
    /// alongside the id for callers that need to correlate hits back to
    /// arena positions.
    pub fn row_with_index(&self, query: usize) -> impl Iterator<Item = (u32, &str, f64)> + '_ {
        let (start, end) = self.row_range(query);
        self.indices[start..end]
            .iter()
            .zip(&self.scores[start..end])
            .map(move |(&i, &s)| (i, self.target_ids[i as usize].as_str(), s))
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = impl Iterator<Item = (&str, f64)> + '_> + '_ {
        (0..self.num_queries()).map(move |q| self.row(q))
    }

    pub fn iter_rows_with_index(&self) -> impl Iterator<Item = impl Iterator<Item = (u32, &str, f64)> + '_> + '_ {
        (0..self.num_queries()).map(move |q| self.row_with_index(q))
    }

    /// Reorder every row in place according to `order`.
    pub fn reorder_all(&mut self, order: RowOrder) {
        for q in 0..self.num_queries() {
            self.reorder_row(q, order);
        }
    }

    pub fn reorder_row(&mut self, query: usize, order: RowOrder) {
        let (start, end) = self.row_range(query);
        let target_ids = &self.target_ids;
        let indices = &mut self.indices[start..end];
        let scores = &mut self.scores[start..end];

        let mut pairs: Vec<(u32, f64)> = indices.iter().copied().zip(scores.iter().copied()).collect();
        let id_of = |i: u32| target_ids[i as usize].as_str();

        match order {
            RowOrder::DecreasingScore => {
                pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| id_of(a.0).cmp(id_of(b.0))));
            }
            RowOrder::IncreasingScore => {
                pairs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| id_of(a.0).cmp(id_of(b.0))));
            }
            RowOrder::DecreasingId => {
                pairs.sort_by(|a, b| id_of(b.0).cmp(id_of(a.0)));
            }
            RowOrder::IncreasingId => {
                pairs.sort_by(|a, b| id_of(a.0).cmp(id_of(b.0)));
            }
            RowOrder::Reverse => {
                pairs.reverse();
            }
            RowOrder::MoveClosestFirst => {
                if let Some(best) = (0..pairs.len()).max_by(|&i, &j| pairs[i].1.partial_cmp(&pairs[j].1).unwrap()) {
                    pairs.swap(0, best);
                }
            }
        }

        for (slot, (index, score)) in indices.iter_mut().zip(scores.iter_mut()).zip(pairs) {
            *slot.0 = index;
            *slot.1 = score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SearchResults {
        SearchResults::from_rows(
            vec![vec![(3, 0.2), (1, 0.9), (2, 0.9)], vec![(0, 0.4)]],
            vec!["zero".into(), "one".into(), "two".into(), "three".into()],
            vec!["q1".into(), "q2".into()],
        )
    }

    #[test]
    fn row_sizes_and_total() {
        let results = sample();
        assert_eq!(results.num_queries(), 2);
        assert_eq!(results.size(0), 3);
        assert_eq!(results.size(1), 1);
        assert_eq!(results.total_hits(), 4);
    }

    #[test]
    fn row_resolves_ids() {
        let results = sample();
        let row: Vec<(&str, f64)> = results.row(0).collect();
        assert_eq!(row, vec![("three", 0.2), ("one", 0.9), ("two", 0.9)]);
    }

    #[test]
    fn decreasing_score_breaks_ties_by_id() {
        let mut results = sample();
        results.reorder_row(0, RowOrder::DecreasingScore);
        let row: Vec<(&str, f64)> = results.row(0).collect();
        // "one" and "two" tie at 0.9; "one" sorts first alphabetically.
        assert_eq!(row, vec![("one", 0.9), ("two", 0.9), ("three", 0.2)]);
    }

    #[test]
    fn increasing_id() {
        let mut results = sample();
        results.reorder_row(0, RowOrder::IncreasingId);
        let row: Vec<(&str, f64)> = results.row(0).collect();
        assert_eq!(row, vec![("one", 0.9), ("three", 0.2), ("two", 0.9)]);
    }

    #[test]
    fn decreasing_id() {
        let mut results = sample();
        results.reorder_row(0, RowOrder::DecreasingId);
        let row: Vec<(&str, f64)> = results.row(0).collect();
        assert_eq!(row, vec![("two", 0.9), ("three", 0.2), ("one", 0.9)]);
    }

    #[test]
    fn move_closest_first_only_touches_the_front() {
        let mut results = sample();
        results.reorder_row(0, RowOrder::MoveClosestFirst);
        let row: Vec<(&str, f64)> = results.row(0).collect();
        assert_eq!(row[0].1, 0.9);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn reverse_is_literal_reversal() {
        let mut results = sample();
        let before: Vec<(&str, f64)> = results.row(0).collect();
        let before_owned: Vec<(String, f64)> = before.into_iter().map(|(id, s)| (id.to_string(), s)).collect();
        results.reorder_row(0, RowOrder::Reverse);
        let after: Vec<(&str, f64)> = results.row(0).collect();
        let after_owned: Vec<(String, f64)> = after.into_iter().map(|(id, s)| (id.to_string(), s)).collect();
        assert_eq!(after_owned, before_owned.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn row_with_index_carries_target_index() {
        let results = sample();
        let row: Vec<(u32, &str, f64)> = results.row_with_index(1).collect();
        assert_eq!(row, vec![(0, "zero", 0.4)]);
    }

    #[test]
    fn iter_rows_with_index_covers_every_query() {
        let results = sample();
        let counts: Vec<usize> = results.iter_rows_with_index().map(|row| row.count()).collect();
        assert_eq!(counts, vec![3, 1]);
    }
}
