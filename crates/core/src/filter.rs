//! Product filter predicate.
//!
//! A product matches when all of the following hold:
//! - the query is a case-insensitive substring of its name or description
//!   (an empty query always matches);
//! - its category equals the selected category, or no category is selected;
//! - its gender is in the selected set (an empty set matches every gender);
//! - its type is in the selected set (an empty set matches every type).
//!
//! Filtering is stable: results keep catalog order.

use std::collections::BTreeSet;

use crate::product::Product;

/// Category sentinel meaning "every category".
pub const ALL_CATEGORIES: &str = "Todas";

/// Filter selections for the product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub query: String,
    /// `None` selects every category.
    pub category: Option<String>,
    pub genders: BTreeSet<String>,
    pub types: BTreeSet<String>,
}

impl ProductFilter {
    /// A filter that matches every product.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Select a category; [`ALL_CATEGORIES`] clears the selection.
    #[must_use]
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = (category != ALL_CATEGORIES && !category.is_empty())
            .then(|| category.to_owned());
        self
    }

    #[must_use]
    pub fn with_genders<I, S>(mut self, genders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genders = genders.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.matches_query(product)
            && self
                .category
                .as_ref()
                .is_none_or(|category| &product.category == category)
            && (self.genders.is_empty() || self.genders.contains(&product.gender))
            && (self.types.is_empty() || self.types.contains(&product.kind))
    }

    fn matches_query(&self, product: &Product) -> bool {
        let query = self.query.to_lowercase();
        query.is_empty()
            || product.name.to_lowercase().contains(&query)
            || product.description.to_lowercase().contains(&query)
    }

    /// The matching products, in catalog order.
    #[must_use]
    pub fn apply<'a>(&self, catalog: &'a [Product]) -> Vec<&'a Product> {
        catalog.iter().filter(|product| self.matches(product)).collect()
    }
}
