//! Cart commands.

use aurora_core::cart::QuantityChange;
use aurora_core::{LineItem, ProductId};
use aurora_storefront::AppState;
use aurora_storefront::error::AppError;

#[allow(clippy::print_stdout)]
pub fn show(state: &AppState) {
    let cart = state.cart();
    let items = cart.items();
    if items.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    for (position, item) in items.iter().enumerate() {
        println!(
            "{:>3}. {:<32} {:>4} x {:>9}  {} / {}",
            position + 1,
            item.name,
            item.quantity,
            item.unit_price.to_string(),
            item.size,
            item.color
        );
    }
    println!(
        "{} items, total {}",
        cart.total_items(),
        cart.total_price()
    );
}

#[allow(clippy::print_stdout)]
pub fn add(
    state: &AppState,
    product_id: ProductId,
    size: Option<&str>,
    color: Option<&str>,
) -> Result<(), AppError> {
    let product = state
        .catalog()
        .get(product_id)
        .ok_or_else(|| AppError::NotFound(format!("Product {product_id}")))?;
    if !product.in_stock {
        return Err(AppError::BadRequest(format!(
            "{} is out of stock",
            product.name
        )));
    }

    let size = size.unwrap_or_else(|| product.default_size());
    let color = color.unwrap_or_else(|| product.default_color());
    let item = state.cart().add_item(product, size, color);
    println!(
        "{} ({} / {}) x {} in cart",
        item.name, item.size, item.color, item.quantity
    );
    Ok(())
}

/// The line at a 1-based position in `cart show`.
fn line_at(state: &AppState, line: usize) -> Result<LineItem, AppError> {
    line.checked_sub(1)
        .and_then(|index| state.cart().items().get(index).cloned())
        .ok_or_else(|| AppError::NotFound(format!("Cart line {line}")))
}

#[allow(clippy::print_stdout)]
pub fn remove(state: &AppState, line: usize) -> Result<(), AppError> {
    let item = line_at(state, line)?;
    if state.cart().remove_item(item.id).is_some() {
        println!("Removed {} from cart", item.name);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn update(state: &AppState, line: usize, quantity: u32) -> Result<(), AppError> {
    let item = line_at(state, line)?;
    match state.cart().update_quantity(item.id, i64::from(quantity)) {
        QuantityChange::Updated(updated) => println!("{} x {}", updated.name, updated.quantity),
        QuantityChange::Removed(removed) => println!("Removed {} from cart", removed.name),
        QuantityChange::Missing => {
            return Err(AppError::NotFound(format!("Cart line {line}")));
        }
    }
    Ok(())
}
