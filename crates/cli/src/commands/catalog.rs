//! Catalog listing.

use aurora_core::{Product, ProductFilter};
use aurora_storefront::AppState;
use aurora_storefront::error::AppError;

/// One catalog row: id, name, price, facets and stock.
pub fn product_row(product: &Product) -> String {
    let stock = if product.in_stock { "" } else { "  (out of stock)" };
    format!(
        "{:>4}  {:<32} {:>9}  {} / {} / {}{stock}",
        product.id,
        product.name,
        product.price.to_string(),
        product.category,
        product.gender,
        product.kind
    )
}

#[allow(clippy::print_stdout)]
pub fn list(
    state: &AppState,
    query: String,
    category: &str,
    genders: Vec<String>,
    kinds: Vec<String>,
) -> Result<(), AppError> {
    let filter = ProductFilter::all()
        .with_query(query)
        .with_category(category)
        .with_genders(genders)
        .with_types(kinds);

    let catalog = state.catalog();
    if let Some(category) = &filter.category
        && !catalog.categories().contains(&category.as_str())
    {
        return Err(AppError::BadRequest(format!(
            "Unknown category {category}; choose one of {}",
            catalog.categories().join(", ")
        )));
    }

    let products = catalog.search(&filter);
    if products.is_empty() {
        println!("No products match.");
        return Ok(());
    }
    for product in products {
        println!("{}", product_row(product));
    }
    Ok(())
}
