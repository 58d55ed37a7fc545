//! Catalog filtering.

#![allow(clippy::unwrap_used)]

use aurora_core::filter::ALL_CATEGORIES;
use aurora_core::{Price, Product, ProductFilter, ProductId};
use aurora_storefront::catalog::Catalog;
use proptest::prelude::*;

fn product(id: i64, name: &str, category: &str, gender: &str, kind: &str) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: String::new(),
        price: Price::from_cents(1500),
        image: String::new(),
        category: category.to_string(),
        gender: gender.to_string(),
        kind: kind.to_string(),
        sizes: Vec::new(),
        colors: Vec::new(),
        in_stock: true,
    }
}

fn ids(products: &[&Product]) -> Vec<i64> {
    products.iter().map(|p| p.id.as_i64()).collect()
}

#[test]
fn test_shirt_and_dress_scenario() {
    let catalog = Catalog::from_products(vec![
        product(1, "Red Shirt", "Casual", "Hombre", "Camiseta"),
        product(2, "Blue Dress", "Formal", "Mujer", "Vestido"),
    ])
    .unwrap();

    let by_query = ProductFilter::all()
        .with_query("shirt")
        .with_category(ALL_CATEGORIES);
    assert_eq!(ids(&catalog.search(&by_query)), vec![1]);

    let by_gender = ProductFilter::all().with_genders(["Mujer"]);
    assert_eq!(ids(&catalog.search(&by_gender)), vec![2]);
}

fn filters() -> impl Strategy<Value = ProductFilter> {
    let queries = prop::sample::select(vec!["", "a", "camis", "SEDA", "zz", "pantalón"]);
    let categories = prop::sample::select(vec![ALL_CATEGORIES, "Casual", "Formal", "Deportivo"]);
    let genders = prop::sample::subsequence(vec!["Hombre", "Mujer", "Niño", "Niña"], 0..=4);
    let kinds = prop::sample::subsequence(
        vec!["Camiseta", "Pantalón", "Vestido", "Chaqueta", "Calzado"],
        0..=5,
    );
    (queries, categories, genders, kinds).prop_map(|(query, category, genders, kinds)| {
        ProductFilter::all()
            .with_query(query)
            .with_category(category)
            .with_genders(genders)
            .with_types(kinds)
    })
}

proptest! {
    #[test]
    fn prop_search_is_an_ordered_matching_subsequence(filter in filters()) {
        let catalog = Catalog::embedded().unwrap();
        let found = ids(&catalog.search(&filter));
        let expected: Vec<i64> = catalog
            .products()
            .iter()
            .filter(|p| filter.matches(p))
            .map(|p| p.id.as_i64())
            .collect();
        prop_assert_eq!(&found, &expected);

        // Filtering the result again changes nothing.
        let narrowed: Vec<Product> = catalog.search(&filter).into_iter().cloned().collect();
        prop_assert_eq!(ids(&filter.apply(&narrowed)), found);
    }
}

#[test]
fn test_empty_filter_matches_everything() {
    let catalog = Catalog::embedded().unwrap();
    let filter = ProductFilter::all().with_category(ALL_CATEGORIES);
    assert_eq!(catalog.search(&filter).len(), catalog.products().len());
}
