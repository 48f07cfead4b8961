use crate::models::Dimensions;

/// Configuration for the multi-column masonry layout.
///
/// Every column has the same width. Items keep their aspect ratio, so an
/// item's height is its column width scaled by `h / w`.
#[derive(Debug, Clone)]
pub struct MasonryLayout {
    /// Number of columns (default: 3)
    pub columns: usize,
    /// Vertical gap between items in a column in pixels (default: 8)
    pub row_gutter: f32,
    /// Horizontal gap between columns in pixels (default: 8)
    pub column_gutter: f32,
}

impl Default for MasonryLayout {
    fn default() -> Self {
        Self {
            columns: 3,
            row_gutter: 8.0,
            column_gutter: 8.0,
        }
    }
}

impl MasonryLayout {
    pub fn new(columns: usize, row_gutter: f32, column_gutter: f32) -> Self {
        Self {
            columns: columns.max(1),
            row_gutter,
            column_gutter,
        }
    }

    /// `(viewport_width - (columns - 1) * column_gutter) / columns`, never negative.
    pub fn column_width(&self, viewport_width: f32) -> f32 {
        let columns = self.columns.max(1) as f32;
        ((viewport_width - (columns - 1.0) * self.column_gutter) / columns).max(0.0)
    }

    /// Pixel height of an item drawn in a column `column_width` wide.
    /// Missing or degenerate dimensions draw the item square.
    pub fn item_height(dimensions: Option<Dimensions>, column_width: f32) -> f32 {
        dimensions
            .map(|d| d.height_for_width(column_width))
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(column_width)
    }

    /// Places the items not yet in `assignment`, each into the currently
    /// shortest column.
    ///
    /// # Algorithm
    /// 1. Measure each new item at the current column width.
    /// 2. Pick the column with the smallest accumulated height; the lowest
    ///    index wins ties.
    /// 3. Add the item's height plus the row gutter to that column.
    ///
    /// Placement happens once per item. Later resizes change heights but
    /// never move an item; only a column-count change starts over.
    ///
    /// # Arguments
    /// * `dimensions` - Natural dimensions of every item in list order
    /// * `column_width` - Current column width in pixels
    /// * `assignment` - Assignment to extend; its first `assigned()` items stay put
    pub fn assign(
        &self,
        dimensions: &[Option<Dimensions>],
        column_width: f32,
        assignment: &mut ColumnAssignment,
    ) {
        if assignment.column_count() != self.columns.max(1) {
            *assignment = ColumnAssignment::new(self.columns);
        }

        for (index, dims) in dimensions.iter().enumerate().skip(assignment.assigned()) {
            let height = Self::item_height(*dims, column_width);
            let column = assignment.shortest_column();
            assignment.push(index, column, height + self.row_gutter);
        }
    }
}

/// Which column each item lives in. Grows as items are appended.
#[derive(Debug, Clone)]
pub struct ColumnAssignment {
    members: Vec<Vec<usize>>,
    heights: Vec<f32>,
    column_of: Vec<usize>,
}

impl ColumnAssignment {
    pub fn new(columns: usize) -> Self {
        let columns = columns.max(1);
        Self {
            members: vec![Vec::new(); columns],
            heights: vec![0.0; columns],
            column_of: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.members.len()
    }

    /// Number of items placed so far.
    pub fn assigned(&self) -> usize {
        self.column_of.len()
    }

    /// Item indices of `column`, top to bottom.
    pub fn column(&self, column: usize) -> &[usize] {
        self.members.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn column_of(&self, index: usize) -> Option<usize> {
        self.column_of.get(index).copied()
    }

    fn shortest_column(&self) -> usize {
        let mut best = 0;
        for (column, height) in self.heights.iter().enumerate() {
            if *height < self.heights[best] {
                best = column;
            }
        }
        best
    }

    fn push(&mut self, index: usize, column: usize, extent: f32) {
        self.heights[column] += extent;
        self.members[column].push(index);
        self.column_of.push(column);
    }
}
