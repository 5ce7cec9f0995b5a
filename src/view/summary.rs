use crate::domain::ClassificationResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Counts results per final category, in order of first appearance.
pub fn category_summary<'a, I>(results: I) -> Vec<CategoryCount>
where
    I: IntoIterator<Item = &'a ClassificationResult>,
{
    let mut counts: Vec<CategoryCount> = Vec::new();
    for result in results {
        let category = result.final_category();
        match counts.iter_mut().find(|entry| entry.category == category) {
            Some(entry) => entry.count += 1,
            None => counts.push(CategoryCount {
                category: category.to_string(),
                count: 1,
            }),
        }
    }
    counts
}
